//! The in-memory frame representation

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Flags, MessageType};

/// A single CHAT frame
///
/// Exists only while traversing the pipeline: decoded from the stream,
/// handed to the dispatcher, and dropped once the response is encoded.
/// The payload is opaque bytes at this level; handlers interpret it as
/// JSON or RSA-wrapped key material depending on `message_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// What the payload means
    pub message_type: MessageType,
    /// Header flag bits
    pub flags: Flags,
    /// Opaque 64-bit correlation token chosen by the requesting side
    pub message_id: u64,
    /// Milliseconds since the Unix epoch at send time
    pub timestamp: u64,
    /// Frame payload, at most 10 MiB
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet stamped with the current time
    pub fn new(message_type: MessageType, message_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            flags: Flags::empty(),
            message_id,
            timestamp: now_millis(),
            payload: payload.into(),
        }
    }

    /// Build a response packet echoing the request's correlation id
    pub fn response_to(request: &Packet, message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            flags: Flags::empty().with(Flags::REPLY),
            message_id: request.message_id,
            timestamp: now_millis(),
            payload: payload.into(),
        }
    }

    /// Replace the payload, keeping header fields
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Whether the ENCRYPTED flag is set
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(Flags::ENCRYPTED)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
