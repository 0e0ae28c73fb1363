//! Error types for the gateway
//!
//! None of these errors end a connection. Session-level failures are turned
//! into 400 responses by the session; only [`Error`] escapes to callers, and
//! only from transport and server setup.

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced outside a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sending a frame to the client failed (connection gone)
    #[error("transport error: {0}")]
    Transport(String),

    /// Server configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Protocol violations, always answered with a 400 response
///
/// The display text is what the client sees in the `message` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not an envelope or has no kind
    #[error("Invalid message. Please make sure message is formatted properly and includes a messageType.")]
    Malformed,

    /// Kind is not served by this endpoint
    #[error("Unknown ADB command.")]
    UnknownKind,

    /// Non-AUTH request before authentication
    #[error("Must authenticate to call ADB commands.")]
    Unauthenticated,

    /// Second AUTH on an authenticated connection
    #[error("Authentication error. Already authenticated.")]
    AlreadyAuthenticated,

    /// AUTH named a device the registry does not know
    #[error("Authentication Failure. Device not found.")]
    AuthDeviceNotFound,

    /// Request named a device the registry does not know
    #[error("Device not found.")]
    DeviceNotFound,

    /// Request named a device other than the one bound at AUTH
    #[error("Device serial mismatch. Connection is bound to {bound}, request named {requested}.")]
    TargetMismatch {
        /// Serial bound at AUTH
        bound: String,
        /// Serial named by the request
        requested: String,
    },

    /// Typed payload could not be decoded
    #[error("Error processing message. Error: {0}")]
    InvalidPayload(String),

    /// Required request field absent
    #[error("Missing required field: {0}.")]
    MissingField(&'static str),

    /// A transfer of the same direction is already active
    #[error("Only one file transfer allowed.")]
    TransferInProgress,

    /// Binary frame with no active push
    #[error("Unsolicited file transfer. Please initiate file transfer request.")]
    UnsolicitedTransfer,
}
