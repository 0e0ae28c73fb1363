//! Device backend abstraction
//!
//! Defines the collaborator traits the session core depends on. The gateway
//! never talks to a device itself: a [`DeviceRegistry`] resolves serials to
//! [`DeviceExecutor`] handles, and the executor performs the actual shell,
//! file, reboot, and status operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use adbgate_proto::FileNode;

/// Shared handle to a resolved device
pub type TargetHandle = Arc<dyn DeviceExecutor>;

/// Errors surfaced by the execution layer
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The device-side command ran and failed
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The bridge refused the command (device offline, unauthorized, ...)
    #[error("device rejected command: {0}")]
    Rejected(String),

    /// Local I/O failure while talking to the bridge
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations against one resolved device
///
/// Calls may block for as long as the device takes; the session applies no
/// timeout of its own.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceExecutor: Send + Sync {
    /// Run a shell command and return its captured output
    async fn run_shell(&self, command: &str) -> Result<String, ExecutionError>;

    /// Reboot the device
    async fn reboot(&self) -> Result<(), ExecutionError>;

    /// Probe whether the device is online
    async fn is_online(&self) -> Result<bool, ExecutionError>;

    /// Describe `path`, with its entries when `with_children` is set
    async fn list_path(
        &self,
        path: &str,
        with_children: bool,
    ) -> Result<FileNode, ExecutionError>;

    /// Copy a local file onto the device at `remote`
    async fn deliver_file(&self, local: &Path, remote: &str) -> Result<(), ExecutionError>;

    /// Copy `remote` from the device into the local file at `local`
    async fn retrieve_file(&self, remote: &str, local: &Path) -> Result<(), ExecutionError>;
}

/// Lookup and enumeration of managed devices
///
/// Implementations must be safe for concurrent use from every connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Resolve a serial to a device handle
    ///
    /// Returns None if the device is not known.
    async fn resolve(&self, serial: &str) -> Option<TargetHandle>;

    /// List every known device
    async fn enumerate(&self) -> Vec<(String, TargetHandle)>;
}
