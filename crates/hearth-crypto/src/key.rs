//! Session key material

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// AES-256 key length in bytes
pub const SESSION_KEY_LEN: usize = 32;

/// The per-connection AES-256 session key
///
/// Wiped from memory on drop. `Debug` never prints key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Adopt existing key bytes, validating the length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SESSION_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                SESSION_KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
