//! Message kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of envelope kinds understood by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Bind the connection to a device
    Auth,
    /// List a path on the device
    DirectoryGet,
    /// Client to device file transfer
    FilePush,
    /// Device to client file transfer
    FilePull,
    /// Reboot the device
    Reboot,
    /// Run a shell command on the device
    ShellCommand,
    /// Online/offline probe
    Status,
    /// Enumerate every known device (admin endpoint only)
    #[serde(alias = "TARGETS_GET")]
    DevicesGet,
}

impl MessageKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Auth => "AUTH",
            MessageKind::DirectoryGet => "DIRECTORY_GET",
            MessageKind::FilePush => "FILE_PUSH",
            MessageKind::FilePull => "FILE_PULL",
            MessageKind::Reboot => "REBOOT",
            MessageKind::ShellCommand => "SHELL_COMMAND",
            MessageKind::Status => "STATUS",
            MessageKind::DevicesGet => "DEVICES_GET",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `messageType` value outside the known set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTH" => Ok(MessageKind::Auth),
            "DIRECTORY_GET" => Ok(MessageKind::DirectoryGet),
            "FILE_PUSH" => Ok(MessageKind::FilePush),
            "FILE_PULL" => Ok(MessageKind::FilePull),
            "REBOOT" => Ok(MessageKind::Reboot),
            "SHELL_COMMAND" => Ok(MessageKind::ShellCommand),
            "STATUS" => Ok(MessageKind::Status),
            "DEVICES_GET" | "TARGETS_GET" => Ok(MessageKind::DevicesGet),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
