//! Cryptographic primitives for Hearth
//!
//! Two algorithms cover the whole protocol: AES-256-GCM for per-connection
//! session traffic and RSA-OAEP (SHA-256 + MGF1-SHA-256) for transporting
//! the session key during the handshake. Both are exposed directly and
//! through the [`plugin`] registry the server hangs onto.

#![forbid(unsafe_code)]

pub mod asymmetric;
pub mod error;
pub mod key;
pub mod plugin;
pub mod symmetric;

pub use error::CryptoError;
pub use key::SessionKey;

/// Result type alias using CryptoError
pub type Result<T> = std::result::Result<T, CryptoError>;
