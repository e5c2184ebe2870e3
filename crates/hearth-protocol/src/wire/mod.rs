//! CHAT wire framing
//!
//! Every frame on the TCP stream has the same shape:
//!
//! ```text
//! ┌────────┬──────┬─────┬───────┬────────────┬─────────┬───────────┬─────────┬───────┐
//! │ magic  │ type │ ver │ flags │ message_id │ pay_len │ timestamp │ payload │ crc32 │
//! │ 4      │ 2    │ 1   │ 1     │ 8          │ 4       │ 8         │ N       │ 4     │
//! └────────┴──────┴─────┴───────┴────────────┴─────────┴───────────┴─────────┴───────┘
//! ```
//!
//! All multi-byte integers are big-endian. The CRC32 (IEEE) trailer covers
//! header and payload. Payloads are capped at 10 MiB and the cap is checked
//! before any payload allocation.

mod codec;
mod flags;
mod message_type;
mod packet;

pub use codec::PacketCodec;
pub use flags::Flags;
pub use message_type::MessageType;
pub use packet::Packet;

/// Frame magic: the ASCII bytes "CHAT"
pub const MAGIC: u32 = 0x4348_4154;

/// Current protocol version byte
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 28;

/// CRC32 trailer size in bytes
pub const TRAILER_LEN: usize = 4;

/// Maximum payload size (10 MiB)
pub const MAX_PAYLOAD_LEN: usize = 10 * 1024 * 1024;

/// AES-GCM IV length inside an encrypted payload
pub const IV_LEN: usize = 12;

/// AES-GCM tag length inside an encrypted payload
pub const TAG_LEN: usize = 16;
