//! CHAT wire protocol and domain model for Hearth
//!
//! Defines the framed binary packet format (28-byte big-endian header,
//! bounded payload, trailing CRC32), the message-type enumeration, the
//! JSON domain entities exchanged as payloads, and the UDP discovery
//! packet format.

#![forbid(unsafe_code)]

pub mod discovery;
pub mod error;
pub mod model;
pub mod payload;
pub mod wire;

pub use error::ProtocolError;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
