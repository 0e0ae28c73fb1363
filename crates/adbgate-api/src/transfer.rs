//! File transfer staging
//!
//! A [`TransferProcessor`] owns one uniquely named staging file for the
//! lifetime of a single push or pull. Push assembles client bytes into the
//! file and hands it to the device once the declared size is reached; pull
//! has the device fill the file and then streams it back to the client.
//!
//! The staging file is removed by [`TransferProcessor::release`], and again
//! on drop if release was never reached, so no exit path leaks it.
//!
//! Completion of a push is decided only by the byte count reaching the size
//! declared in the request. There is no checksum.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{DeviceExecutor, ExecutionError};
use crate::websocket::{Frame, FrameSink};

/// Largest binary frame sent during a pull
pub const PULL_BUFFER_SIZE: usize = 64 * 1024;

const STAGING_PREFIX: &str = "adbgate-";

/// Errors from staging and moving a file
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The staging file could not be created
    #[error("failed to allocate staging file {path}: {source}")]
    ResourceAllocation {
        /// Path that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Reading or writing the staging file failed
    #[error("staging I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client sent more bytes than it declared
    #[error("received {received} bytes, more than the declared {declared}")]
    Overflow {
        /// Size declared in the push request
        declared: u64,
        /// Bytes received including the rejected chunk
        received: u64,
    },

    /// The device side of the transfer failed
    #[error("device transfer failed: {0}")]
    Device(#[from] ExecutionError),

    /// The client connection went away mid-stream
    #[error("client connection lost: {0}")]
    Sink(String),

    /// The processor was used after release
    #[error("staging file already released")]
    Released,
}

/// Declared metadata of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    /// Full path of the file on the device
    pub remote_path: String,
    /// File name as declared by the client
    pub file_name: Option<String>,
    /// Declared size in bytes (push completion oracle)
    pub declared_size: u64,
}

/// One in-flight push or pull and its staging file
#[derive(Debug)]
pub struct TransferProcessor {
    spec: TransferSpec,
    path: Option<PathBuf>,
    file: Option<File>,
    transferred: u64,
}

impl TransferProcessor {
    /// Allocate a fresh, empty staging file under `staging_dir`
    pub async fn create(staging_dir: &Path, spec: TransferSpec) -> Result<Self, TransferError> {
        let path = staging_dir.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let alloc = |source: io::Error| TransferError::ResourceAllocation {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(staging_dir).await.map_err(alloc)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(alloc)?;

        debug!(
            staging = %path.display(),
            remote = %spec.remote_path,
            declared_size = spec.declared_size,
            "Allocated staging file"
        );

        Ok(Self {
            spec,
            path: Some(path),
            file: Some(file),
            transferred: 0,
        })
    }

    /// Declared metadata
    pub fn spec(&self) -> &TransferSpec {
        &self.spec
    }

    /// Staging file location, None once released
    pub fn staging_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes appended (push) or streamed (pull) so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Whether the appended byte count equals the declared size
    pub fn is_complete(&self) -> bool {
        self.transferred == self.spec.declared_size
    }

    /// Append one chunk of pushed bytes
    ///
    /// A chunk that would take the total past the declared size is rejected
    /// without writing anything.
    pub async fn append_chunk(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        let received = self.transferred + bytes.len() as u64;
        if received > self.spec.declared_size {
            return Err(TransferError::Overflow {
                declared: self.spec.declared_size,
                received,
            });
        }

        let file = self.file.as_mut().ok_or(TransferError::Released)?;
        file.write_all(bytes).await?;
        self.transferred = received;

        if self.is_complete() {
            if let Some(mut file) = self.file.take() {
                file.flush().await?;
            }
        }
        Ok(())
    }

    /// Hand the assembled file to the device at the declared remote path
    pub async fn deliver_to_target(
        &mut self,
        executor: &dyn DeviceExecutor,
    ) -> Result<(), TransferError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        let path = self.path.as_deref().ok_or(TransferError::Released)?;

        debug!(
            staging = %path.display(),
            remote = %self.spec.remote_path,
            "Delivering staged file to device"
        );
        executor.deliver_file(path, &self.spec.remote_path).await?;
        Ok(())
    }

    /// Have the device write the remote file into the staging file
    ///
    /// Returns the staged size in bytes.
    pub async fn retrieve_from_target(
        &mut self,
        executor: &dyn DeviceExecutor,
    ) -> Result<u64, TransferError> {
        self.file.take();
        let path = self.path.as_deref().ok_or(TransferError::Released)?;

        debug!(
            remote = %self.spec.remote_path,
            staging = %path.display(),
            "Retrieving file from device"
        );
        executor.retrieve_file(&self.spec.remote_path, path).await?;
        Ok(fs::metadata(path).await?.len())
    }

    /// Stream the staged file to the client as binary frames
    ///
    /// Every frame is `buffer_size` bytes except the last, which carries
    /// exactly the remainder. There is no cancellation point between frames.
    pub async fn stream_to<S>(&mut self, sink: &mut S, buffer_size: usize) -> Result<u64, TransferError>
    where
        S: FrameSink + ?Sized,
    {
        let path = self.path.clone().ok_or(TransferError::Released)?;
        let buffer_size = buffer_size.max(1) as u64;

        let mut file = File::open(&path).await?;
        let mut remaining = file.metadata().await?.len();
        let mut sent = 0u64;

        while remaining > 0 {
            let chunk_len = remaining.min(buffer_size);
            let mut chunk = vec![0u8; chunk_len as usize];
            file.read_exact(&mut chunk).await?;
            sink.send_frame(Frame::Binary(chunk))
                .await
                .map_err(|e| TransferError::Sink(e.to_string()))?;
            remaining -= chunk_len;
            sent += chunk_len;
        }

        self.transferred = sent;
        Ok(sent)
    }

    /// Close the handle and delete the staging file
    ///
    /// Safe to call any number of times, including after a partial failure.
    pub async fn release(&mut self) {
        self.file.take();
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(staging = %path.display(), "Released staging file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    staging = %path.display(),
                    error = %e,
                    "Failed to remove staging file"
                ),
            }
        }
    }
}

impl Drop for TransferProcessor {
    fn drop(&mut self) {
        self.file.take();
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
