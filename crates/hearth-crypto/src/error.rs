//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material has the wrong algorithm or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// IV is not the 12 bytes AES-GCM requires
    #[error("invalid IV length: expected 12, got {0}")]
    InvalidIvLength(usize),

    /// Tag is not the 16 bytes AES-GCM produces
    #[error("invalid tag length: expected 16, got {0}")]
    InvalidTagLength(usize),

    /// GCM authentication failed: ciphertext, tag or IV was tampered with
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Handshake key material was malformed or undecryptable
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Encryption failed for a non-key reason
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed for a non-authentication reason
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// No plugin registered under the requested name
    #[error("unknown encryption plugin: {0}")]
    UnknownPlugin(String),
}
