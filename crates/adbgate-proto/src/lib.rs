//! Envelope definitions for the adbgate websocket protocol.
//!
//! Every text frame exchanged between a client and the gateway is a JSON
//! envelope. Requests name a [`MessageKind`] and usually a device serial;
//! responses echo the request back with `statusCode` and `message` filled in
//! plus any kind-specific output fields.
//!
//! # Message Flow
//!
//! ```text
//! client                                   gateway
//!   │  {"messageType":"AUTH","deviceSerial":"ABC123"}
//!   │ ───────────────────────────────────────►│
//!   │  {"messageType":"AUTH","statusCode":200,"message":"Auth success.",...}
//!   │ ◄───────────────────────────────────────│
//!   │  {"messageType":"FILE_PUSH","fullPath":"/sdcard/a.bin","size":5}
//!   │ ───────────────────────────────────────►│
//!   │  {..."statusCode":201,"message":"Ready for push. Waiting for data."}
//!   │ ◄───────────────────────────────────────│
//!   │  <binary frame: 5 bytes>                │
//!   │ ───────────────────────────────────────►│
//!   │  {..."statusCode":200,"message":"File push successful."}
//!   │ ◄───────────────────────────────────────│
//! ```
//!
//! # Decoding
//!
//! Requests are decoded in two steps. [`Header::decode`] reads only the kind
//! and target so the session can gate and route before committing to a
//! payload shape, then [`Request::decode`] reads the typed envelope for that
//! kind.
//!
//! ```rust
//! use adbgate_proto::{Header, MessageKind, Request};
//!
//! let raw = r#"{"messageType":"SHELL_COMMAND","deviceSerial":"ABC123","shellCommand":"echo hi"}"#;
//! let header = Header::decode(raw).unwrap();
//! assert_eq!(header.kind().unwrap(), MessageKind::ShellCommand);
//!
//! match Request::decode(raw, MessageKind::ShellCommand).unwrap() {
//!     Request::ShellCommand(env) => assert_eq!(env.payload.shell_command.as_deref(), Some("echo hi")),
//!     _ => unreachable!(),
//! }
//! ```

#![deny(missing_docs)]

mod envelope;
mod kind;
mod payload;

pub use envelope::{DecodeError, Envelope, Header, Request};
pub use kind::{MessageKind, UnknownKind};
pub use payload::{
    DeviceList, DeviceState, DeviceStatus, DirectoryQuery, FileNode, FileTransfer, NoPayload,
    ShellCommand, StatusQuery,
};

/// Response status codes carried in `statusCode`
pub mod status {
    /// Request succeeded
    pub const OK: u16 = 200;
    /// Request accepted; binary streaming follows
    pub const READY: u16 = 201;
    /// Any client, protocol, or device-side failure
    pub const BAD_REQUEST: u16 = 400;
}
