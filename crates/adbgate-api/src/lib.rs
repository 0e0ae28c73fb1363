//! adbgate Gateway
//!
//! Exposes device management (shell, file transfer, directory listing,
//! reboot, status) to websocket clients. Each connection gets its own
//! [`Session`] which authenticates, dispatches typed envelopes to a
//! [`DeviceExecutor`], and runs the chunked file transfer sub-protocol on the
//! same socket.
//!
//! # Architecture
//!
//! ```text
//! client ──ws──► Session ──► TargetResolution ──► DeviceRegistry
//!                   │                                  │
//!                   └── TransferProcessor ──► DeviceExecutor (adb, ...)
//! ```
//!
//! # Endpoints
//!
//! - `GET /adb` - Single-target session, bound to one device by `AUTH`
//! - `GET /admin/adb` - Admin session, every request names its device
//! - `GET /healthz` - Health check

#![deny(missing_docs)]

pub mod backend;
pub mod connection;
pub mod error;
pub mod registry_cache;
pub mod server;
pub mod session;
pub mod transfer;
pub mod websocket;

pub use backend::{DeviceExecutor, DeviceRegistry, ExecutionError, TargetHandle};
pub use error::{Error, ProtocolError, Result};
pub use registry_cache::RegistryCache;
pub use server::{router, start_server, AppState, ServerConfig};
pub use session::{AdminSession, Session, SessionState, TargetResolution, TargetSession};
pub use transfer::{TransferError, TransferProcessor, TransferSpec, PULL_BUFFER_SIZE};
pub use websocket::{Frame, FrameSink};
