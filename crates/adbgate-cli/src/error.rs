//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(#[from] adbgate_api::Error),

    #[error("adb not usable at {path}: {message}")]
    AdbUnavailable { path: String, message: String },
}
