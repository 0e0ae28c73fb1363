//! Per-connection protocol state machine
//!
//! A [`Session`] owns everything one websocket connection needs: its
//! resolution strategy, and the push and pull transfer slots. Frames are fed
//! in arrival order through [`Session::on_text_frame`] and
//! [`Session::on_binary_frame`]; responses go out through a [`FrameSink`].
//!
//! No failure inside a session is fatal. Every protocol, transfer, and
//! device error becomes a 400 envelope and the connection stays open.

mod handlers;
mod resolution;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use adbgate_proto::{status, DecodeError, Envelope, FileTransfer, Header, MessageKind, Request};

use crate::backend::{DeviceRegistry, TargetHandle};
use crate::error::ProtocolError;
use crate::registry_cache::RegistryCache;
use crate::transfer::{TransferError, TransferProcessor, PULL_BUFFER_SIZE};
use crate::websocket::{Frame, FrameSink};

pub use resolution::{
    ResolveOnce, ResolvePerMessage, ResolvedTarget, SessionState, TargetResolution,
};

/// Session bound to one device by `AUTH`
pub type TargetSession = Session<ResolveOnce>;

/// Session resolving the device per message
pub type AdminSession = Session<ResolvePerMessage>;

/// An active push: the staging file plus where it is going
struct PushTransfer {
    processor: TransferProcessor,
    target: TargetHandle,
    request: Envelope<FileTransfer>,
}

/// Protocol state of one connection
pub struct Session<R> {
    id: String,
    resolution: R,
    staging_dir: PathBuf,
    pull_buffer_size: usize,
    push: Option<PushTransfer>,
    pull: Option<TransferProcessor>,
}

impl TargetSession {
    /// Create a single-target session
    pub fn single_target(registry: Arc<dyn DeviceRegistry>, staging_dir: PathBuf) -> Self {
        Session::new(ResolveOnce::new(registry), staging_dir)
    }
}

impl AdminSession {
    /// Create an admin session over a shared registry cache
    pub fn admin(cache: RegistryCache, staging_dir: PathBuf) -> Self {
        Session::new(ResolvePerMessage::new(cache), staging_dir)
    }
}

impl<R: TargetResolution> Session<R> {
    /// Create a session with an explicit resolution strategy
    pub fn new(resolution: R, staging_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resolution,
            staging_dir,
            pull_buffer_size: PULL_BUFFER_SIZE,
            push: None,
            pull: None,
        }
    }

    /// Override the largest binary frame sent during a pull
    pub fn with_pull_buffer_size(mut self, size: usize) -> Self {
        self.pull_buffer_size = size.max(1);
        self
    }

    /// Connection id used in logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current authentication state
    pub fn state(&self) -> SessionState {
        self.resolution.state()
    }

    /// The active push transfer, if any
    pub fn active_push(&self) -> Option<&TransferProcessor> {
        self.push.as_ref().map(|push| &push.processor)
    }

    /// Whether a pull is in progress
    pub fn has_active_pull(&self) -> bool {
        self.pull.is_some()
    }

    /// Connection opened
    pub fn on_open(&self) {
        info!(connection_id = %self.id, state = %self.state(), "Connection opened");
    }

    /// Handle one text frame
    pub async fn on_text_frame<S>(&mut self, raw: &str, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        debug!(connection_id = %self.id, len = raw.len(), "Received text frame");
        trace!(connection_id = %self.id, frame = %raw, "Text frame payload");

        let header = match Header::decode(raw) {
            Ok(header) => header,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "Undecodable text frame");
                self.reject(sink, None, None, ProtocolError::Malformed).await;
                return;
            }
        };

        let kind = match header.kind() {
            Ok(kind) => kind,
            Err(DecodeError::UnknownKind(e)) => {
                debug!(connection_id = %self.id, error = %e, "Unknown message kind");
                self.reject(sink, None, header.device_serial.clone(), ProtocolError::UnknownKind)
                    .await;
                return;
            }
            Err(_) => {
                self.reject(sink, None, header.device_serial.clone(), ProtocolError::Malformed)
                    .await;
                return;
            }
        };

        if self.resolution.requires_auth()
            && (kind == MessageKind::Auth || !self.resolution.state().is_authenticated())
        {
            self.authenticate(kind, &header, raw, sink).await;
            return;
        }

        match kind {
            MessageKind::DevicesGet => self.handle_devices_get(raw, sink).await,
            MessageKind::Auth => {
                self.reject(
                    sink,
                    Some(kind),
                    header.device_serial.clone(),
                    ProtocolError::UnknownKind,
                )
                .await
            }
            _ => self.dispatch(kind, &header, raw, sink).await,
        }
    }

    /// Handle one binary frame
    ///
    /// `is_last` is the transport's fragment flag. It is logged but never
    /// used to decide completion; only the declared size does that.
    pub async fn on_binary_frame<S>(&mut self, bytes: &[u8], is_last: bool, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        debug!(
            connection_id = %self.id,
            len = bytes.len(),
            is_last,
            "Received binary frame"
        );

        let Some(push) = self.push.as_mut() else {
            info!(connection_id = %self.id, "Unsolicited file transfer, rejecting");
            let envelope: Envelope<FileTransfer> =
                Envelope::new(MessageKind::FilePush, self.state().serial());
            self.reply_error(sink, envelope, ProtocolError::UnsolicitedTransfer.to_string())
                .await;
            return;
        };

        let outcome = advance_push(push, bytes).await;
        match outcome {
            Ok(false) => {}
            Ok(true) => {
                if let Some(mut push) = self.push.take() {
                    info!(
                        connection_id = %self.id,
                        remote = %push.processor.spec().remote_path,
                        size = push.processor.transferred(),
                        "File push delivered"
                    );
                    push.processor.release().await;
                    self.reply(sink, push.request, status::OK, "File push successful.")
                        .await;
                }
            }
            Err(e) => {
                if let Some(mut push) = self.push.take() {
                    warn!(
                        connection_id = %self.id,
                        remote = %push.processor.spec().remote_path,
                        transferred = push.processor.transferred(),
                        error = %e,
                        "File push failed, discarding partial data"
                    );
                    push.processor.release().await;
                    self.reply_error(sink, push.request, format!("File transfer error: {}", e))
                        .await;
                }
            }
        }
    }

    /// Connection closed or failed; release any staging files
    pub async fn on_close(&mut self) {
        if let Some(mut push) = self.push.take() {
            info!(
                connection_id = %self.id,
                transferred = push.processor.transferred(),
                declared = push.processor.spec().declared_size,
                "Discarding incomplete push on close"
            );
            push.processor.release().await;
        }
        if let Some(mut pull) = self.pull.take() {
            pull.release().await;
        }
        info!(connection_id = %self.id, state = %self.state(), "Connection closed");
    }

    async fn authenticate<S>(&mut self, kind: MessageKind, header: &Header, raw: &str, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        let serial = header.device_serial.clone();
        if self.state().is_authenticated() {
            self.reject(sink, Some(kind), serial, ProtocolError::AlreadyAuthenticated)
                .await;
            return;
        }
        if kind != MessageKind::Auth {
            self.reject(sink, Some(kind), serial, ProtocolError::Unauthenticated)
                .await;
            return;
        }

        let envelope = match Request::decode(raw, kind) {
            Ok(Request::Auth(envelope)) => envelope,
            _ => Envelope::new(kind, serial),
        };

        match self.resolution.authenticate(header.target()).await {
            Ok(bound) => {
                info!(connection_id = %self.id, serial = %bound, "Authenticated");
                let mut envelope = envelope;
                envelope.device_serial = Some(bound);
                self.reply(sink, envelope, status::OK, "Auth success.").await;
            }
            Err(e) => {
                info!(
                    connection_id = %self.id,
                    serial = ?header.target(),
                    error = %e,
                    "Authentication failed"
                );
                self.reply_error(sink, envelope, e.to_string()).await;
            }
        }
    }

    async fn dispatch<S>(&mut self, kind: MessageKind, header: &Header, raw: &str, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        let target = match self.resolution.resolve(header.target()).await {
            Ok(target) => target,
            Err(e) => {
                self.reject(sink, Some(kind), header.device_serial.clone(), e)
                    .await;
                return;
            }
        };

        let request = match Request::decode(raw, kind) {
            Ok(request) => request,
            Err(e) => {
                let err = ProtocolError::InvalidPayload(e.to_string());
                self.reject(sink, Some(kind), Some(target.serial), err).await;
                return;
            }
        };

        debug!(
            connection_id = %self.id,
            serial = %target.serial,
            kind = %kind,
            "Dispatching request"
        );

        match request {
            Request::DirectoryGet(env) => self.handle_directory_get(target, env, sink).await,
            Request::FilePush(env) => self.handle_file_push(target, env, sink).await,
            Request::FilePull(env) => self.handle_file_pull(target, env, sink).await,
            Request::Reboot(env) => self.handle_reboot(target, env, sink).await,
            Request::ShellCommand(env) => self.handle_shell_command(target, env, sink).await,
            Request::Status(env) => self.handle_status(target, env, sink).await,
            Request::Auth(_) | Request::DevicesGet(_) => {
                self.reject(sink, Some(kind), Some(target.serial), ProtocolError::UnknownKind)
                    .await
            }
        }
    }

    async fn reject<S>(
        &self,
        sink: &mut S,
        kind: Option<MessageKind>,
        serial: Option<String>,
        err: ProtocolError,
    ) where
        S: FrameSink + ?Sized,
    {
        let message = err.to_string();
        let envelope = Envelope::error(kind, serial, message.clone());
        self.reply_error(sink, envelope, message).await;
    }

    async fn reply_error<S, P>(&self, sink: &mut S, envelope: Envelope<P>, message: String)
    where
        S: FrameSink + ?Sized,
        P: Serialize,
    {
        info!(
            connection_id = %self.id,
            kind = ?envelope.message_type,
            serial = ?envelope.device_serial,
            error = %message,
            "Sending error to client"
        );
        self.reply(sink, envelope, status::BAD_REQUEST, message).await;
    }

    async fn reply<S, P>(
        &self,
        sink: &mut S,
        envelope: Envelope<P>,
        status_code: u16,
        message: impl Into<String>,
    ) where
        S: FrameSink + ?Sized,
        P: Serialize,
    {
        let envelope = envelope.respond(status_code, message);
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                error!(connection_id = %self.id, error = %e, "Failed to encode response");
                return;
            }
        };

        debug!(
            connection_id = %self.id,
            kind = ?envelope.message_type,
            status = status_code,
            "Sending response"
        );
        trace!(connection_id = %self.id, frame = %text, "Response payload");

        if let Err(e) = sink.send_frame(Frame::Text(text)).await {
            warn!(connection_id = %self.id, error = %e, "Failed to send response");
        }
    }
}

/// Append a chunk and deliver once the declared size is reached
///
/// Returns whether the push finished.
async fn advance_push(push: &mut PushTransfer, bytes: &[u8]) -> Result<bool, TransferError> {
    push.processor.append_chunk(bytes).await?;
    if !push.processor.is_complete() {
        return Ok(false);
    }
    push.processor.deliver_to_target(push.target.as_ref()).await?;
    Ok(true)
}
