//! Kind-specific payload fields
//!
//! Each payload is flattened into the [`Envelope`](crate::Envelope) so the
//! wire shape stays a single flat JSON object.

use serde::{Deserialize, Serialize};

/// Payload for kinds without extra fields (`AUTH`, `REBOOT`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoPayload {}

/// `DIRECTORY_GET` fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryQuery {
    /// Path to list on the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether to include the entries of a directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_children: Option<bool>,
    /// Listing result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_detail: Option<FileNode>,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Entry name (last path component)
    pub name: String,
    /// Absolute path on the device
    pub path: String,
    /// Whether the entry is a directory
    #[serde(default)]
    pub directory: bool,
    /// Size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Permission string as reported by the device (e.g. `drwxr-xr-x`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// Modification time as reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    /// Directory entries, when requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

/// `FILE_PUSH` / `FILE_PULL` fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    /// Full remote path on the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    /// File name as declared by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Declared byte size (push) or bytes streamed (pull response)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// `SHELL_COMMAND` fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellCommand {
    /// Command line to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
    /// Captured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command_output: Option<String>,
}

/// Online/offline state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Device is reachable
    Online,
    /// Device is not reachable
    Offline,
}

impl From<bool> for DeviceState {
    fn from(online: bool) -> Self {
        if online {
            DeviceState::Online
        } else {
            DeviceState::Offline
        }
    }
}

/// `STATUS` fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    /// Probe result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceState>,
}

/// One entry of a `DEVICES_GET` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// Device serial
    pub device_serial: String,
    /// Probe result
    pub status: DeviceState,
}

/// `DEVICES_GET` fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    /// Every known device with its state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceStatus>>,
}
