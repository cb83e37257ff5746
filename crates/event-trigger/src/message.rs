//! Wire messages sent to the EventMonitor.
//!
//! Every message is a single JSON object terminated by a newline:
//!
//! ```text
//! {"type":"INFO","message":"Module started","client":1,"timestamp":"2024-05-01 12:00:00"}
//! ```

use crate::error::Result;
use crate::ClientId;
use serde::{Deserialize, Serialize};

/// Timestamp layout used on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Message types understood by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Data,
    Info,
    Warning,
    Error,
    Critical,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Data => "DATA",
            MessageType::Info => "INFO",
            MessageType::Warning => "WARNING",
            MessageType::Error => "ERROR",
            MessageType::Critical => "CRITICAL",
        }
    }

    /// Returns all message types.
    pub fn all() -> &'static [MessageType] {
        &[
            MessageType::Data,
            MessageType::Info,
            MessageType::Warning,
            MessageType::Error,
            MessageType::Critical,
        ]
    }

    /// Position of this type in [`MessageType::all`].
    pub fn index(&self) -> usize {
        match self {
            MessageType::Data => 0,
            MessageType::Info => 1,
            MessageType::Warning => 2,
            MessageType::Error => 3,
            MessageType::Critical => 4,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status or telemetry message.
///
/// Messages are built right before they are sent and never stored by the
/// simulator; the timestamp is taken at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub message: String,
    pub client: ClientId,
    pub timestamp: String,
}

impl Message {
    pub fn new(kind: MessageType, message: impl Into<String>, client: ClientId) -> Self {
        Self {
            kind,
            message: message.into(),
            client,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// First message of every client.
    pub fn started(client: ClientId) -> Self {
        Self::new(MessageType::Info, "Module started", client)
    }

    /// Raw sensor sample.
    pub fn data(client: ClientId, value: f64) -> Self {
        Self::new(MessageType::Data, format!("value:{:.2}", value), client)
    }

    /// Serializes the message into its newline-terminated wire form.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parses one wire line; a trailing newline is accepted.
    pub fn from_wire(line: &[u8]) -> Result<Self> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        Ok(serde_json::from_slice(line)?)
    }
}
