//! Frame flag bitfield

use std::fmt;

/// Header flags byte
///
/// Unused bits are preserved on decode so a round-trip never loses them.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// Payload is `iv ∥ tag ∥ ciphertext` under the connection session key
    pub const ENCRYPTED: Flags = Flags(0x80);
    /// Payload is compressed (reserved, never set by this implementation)
    pub const COMPRESSED: Flags = Flags(0x40);
    /// Urgent delivery hint
    pub const URGENT: Flags = Flags(0x20);
    /// Sender expects an acknowledgement
    pub const ACK_REQUIRED: Flags = Flags(0x10);
    /// Frame is a reply correlated by message_id
    pub const REPLY: Flags = Flags(0x08);

    /// Empty flag set
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Construct from the raw header byte
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Raw byte value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether all bits of `other` are set
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Return a copy with the bits of `other` set
    #[must_use]
    pub const fn with(self, other: Flags) -> Self {
        Flags(self.0 | other.0)
    }

    /// Return a copy with the bits of `other` cleared
    #[must_use]
    pub const fn without(self, other: Flags) -> Self {
        Flags(self.0 & !other.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ENCRYPTED) {
            names.push("ENCRYPTED");
        }
        if self.contains(Self::COMPRESSED) {
            names.push("COMPRESSED");
        }
        if self.contains(Self::URGENT) {
            names.push("URGENT");
        }
        if self.contains(Self::ACK_REQUIRED) {
            names.push("ACK_REQUIRED");
        }
        if self.contains(Self::REPLY) {
            names.push("REPLY");
        }
        write!(f, "Flags({:#04x}", self.0)?;
        if !names.is_empty() {
            write!(f, ": {}", names.join("|"))?;
        }
        write!(f, ")")
    }
}
