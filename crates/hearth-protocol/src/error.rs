//! Protocol error types

use std::fmt;

/// Protocol-layer errors
///
/// Every variant except `InvalidPayload` is fatal for the connection that
/// produced it: the frame cannot be trusted, so the stream is torn down.
#[derive(Debug)]
pub enum ProtocolError {
    /// First four bytes of a frame were not the CHAT magic
    BadMagic {
        /// The bytes actually found on the wire
        found: [u8; 4],
    },
    /// Declared payload length is negative (signed) or above the 10 MiB cap
    PayloadOverflow {
        /// The raw length field as read from the header
        length: i64,
    },
    /// CRC32 trailer did not match the frame contents
    ChecksumMismatch {
        /// CRC32 carried in the trailer
        expected: u32,
        /// CRC32 computed over header and payload
        actual: u32,
    },
    /// Message-type code not in the CHAT enumeration
    UnknownMessageType(u16),
    /// Frame arrived with the ENCRYPTED flag but no session key is bound
    NoSessionKey,
    /// Payload bytes could not be interpreted for this message type
    InvalidPayload(String),
    /// Payload exceeds the maximum frame payload on encode
    PayloadTooLarge {
        /// Actual payload size in bytes
        size: usize,
    },
    /// IO error from the underlying stream
    Io(std::io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { found } => {
                write!(f, "bad magic: {:02x}{:02x}{:02x}{:02x}", found[0], found[1], found[2], found[3])
            }
            Self::PayloadOverflow { length } => {
                write!(f, "payload length {} outside [0, 10485760]", length)
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "crc32 mismatch: frame says {:08x}, computed {:08x}", expected, actual)
            }
            Self::UnknownMessageType(code) => write!(f, "unknown message type 0x{:04x}", code),
            Self::NoSessionKey => write!(f, "encrypted frame received before key exchange"),
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            Self::PayloadTooLarge { size } => {
                write!(f, "payload of {} bytes exceeds frame limit", size)
            }
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl ProtocolError {
    /// Whether this error requires closing the connection
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidPayload(_))
    }
}
