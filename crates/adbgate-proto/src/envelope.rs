//! Envelope, header, and typed request decoding

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::kind::{MessageKind, UnknownKind};
use crate::payload::{
    DeviceList, DirectoryQuery, FileTransfer, NoPayload, ShellCommand, StatusQuery,
};
use crate::status;

/// Errors from decoding a text frame
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not a JSON object of the expected shape
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame carries no `messageType`
    #[error("envelope has no messageType")]
    MissingKind,

    /// Frame carries a `messageType` outside the known set
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
}

/// A request or response unit
///
/// Requests normally omit `status_code` and `message`; responses always
/// set both. `P` carries the kind-specific fields and is flattened into the
/// same JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P = NoPayload> {
    /// Message kind, absent only on error responses to undecodable frames
    #[serde(default, alias = "kind", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageKind>,
    /// Response status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Human-readable response message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Target device serial
    #[serde(default, alias = "targetId", skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    /// Kind-specific fields
    #[serde(flatten)]
    pub payload: P,
}

impl<P: Default> Envelope<P> {
    /// Create an envelope of `kind` for `device_serial` with an empty payload
    pub fn new(kind: MessageKind, device_serial: Option<String>) -> Self {
        Self {
            message_type: Some(kind),
            status_code: None,
            message: None,
            device_serial,
            payload: P::default(),
        }
    }
}

impl Envelope<NoPayload> {
    /// Build a 400 response not tied to any decoded request payload
    pub fn error(
        kind: Option<MessageKind>,
        device_serial: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message_type: kind,
            status_code: None,
            message: None,
            device_serial,
            payload: NoPayload::default(),
        }
        .respond(status::BAD_REQUEST, message)
    }
}

impl<P> Envelope<P> {
    /// Turn this envelope into a response with the given status and message
    pub fn respond(mut self, status_code: u16, message: impl Into<String>) -> Self {
        self.status_code = Some(status_code);
        self.message = Some(message.into());
        self
    }

    /// Target serial, treating an empty string as absent
    pub fn target(&self) -> Option<&str> {
        non_empty(self.device_serial.as_deref())
    }
}

impl<P: Serialize> Envelope<P> {
    /// Serialize to the JSON text frame representation
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<P: DeserializeOwned> Envelope<P> {
    /// Deserialize from a JSON text frame
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// The generic envelope shape every request is decoded into first
///
/// Only the routing fields are read; kind-specific fields are ignored until
/// the session knows which payload to expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Raw `messageType` value
    #[serde(default, alias = "kind")]
    pub message_type: Option<String>,
    /// Raw `deviceSerial` value
    #[serde(default, alias = "targetId")]
    pub device_serial: Option<String>,
}

impl Header {
    /// Decode the routing fields of a text frame
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The declared kind, rejecting absent and unrecognized values
    pub fn kind(&self) -> Result<MessageKind, DecodeError> {
        match self.message_type.as_deref() {
            None => Err(DecodeError::MissingKind),
            Some(raw) => Ok(raw.parse()?),
        }
    }

    /// Target serial, treating an empty string as absent
    pub fn target(&self) -> Option<&str> {
        non_empty(self.device_serial.as_deref())
    }
}

/// A fully decoded request, one variant per kind
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `AUTH`
    Auth(Envelope),
    /// `DIRECTORY_GET`
    DirectoryGet(Envelope<DirectoryQuery>),
    /// `FILE_PUSH`
    FilePush(Envelope<FileTransfer>),
    /// `FILE_PULL`
    FilePull(Envelope<FileTransfer>),
    /// `REBOOT`
    Reboot(Envelope),
    /// `SHELL_COMMAND`
    ShellCommand(Envelope<ShellCommand>),
    /// `STATUS`
    Status(Envelope<StatusQuery>),
    /// `DEVICES_GET`
    DevicesGet(Envelope<DeviceList>),
}

impl Request {
    /// Decode the typed envelope for `kind`
    ///
    /// The kind is stamped onto the decoded envelope so responses always
    /// echo the kind the request was routed as.
    pub fn decode(raw: &str, kind: MessageKind) -> Result<Self, DecodeError> {
        let request = match kind {
            MessageKind::Auth => Request::Auth(decode_as(raw, kind)?),
            MessageKind::DirectoryGet => Request::DirectoryGet(decode_as(raw, kind)?),
            MessageKind::FilePush => Request::FilePush(decode_as(raw, kind)?),
            MessageKind::FilePull => Request::FilePull(decode_as(raw, kind)?),
            MessageKind::Reboot => Request::Reboot(decode_as(raw, kind)?),
            MessageKind::ShellCommand => Request::ShellCommand(decode_as(raw, kind)?),
            MessageKind::Status => Request::Status(decode_as(raw, kind)?),
            MessageKind::DevicesGet => Request::DevicesGet(decode_as(raw, kind)?),
        };
        Ok(request)
    }

    /// Kind of this request
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::Auth(_) => MessageKind::Auth,
            Request::DirectoryGet(_) => MessageKind::DirectoryGet,
            Request::FilePush(_) => MessageKind::FilePush,
            Request::FilePull(_) => MessageKind::FilePull,
            Request::Reboot(_) => MessageKind::Reboot,
            Request::ShellCommand(_) => MessageKind::ShellCommand,
            Request::Status(_) => MessageKind::Status,
            Request::DevicesGet(_) => MessageKind::DevicesGet,
        }
    }
}

fn decode_as<P: DeserializeOwned>(
    raw: &str,
    kind: MessageKind,
) -> Result<Envelope<P>, DecodeError> {
    let mut envelope: Envelope<P> = Envelope::decode(raw)?;
    envelope.message_type = Some(kind);
    Ok(envelope)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
