//! AES-256-GCM session encryption
//!
//! Every encrypted frame payload is the concatenation `iv ∥ tag ∥ ciphertext`
//! with a 12-byte IV drawn fresh from the OS RNG per encryption and a
//! 16-byte authentication tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::key::SessionKey;
use crate::{CryptoError, Result};

/// AES-GCM IV length in bytes
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// One encrypted payload, split into its wire components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Serialize as `iv ∥ tag ∥ ciphertext`
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a wire payload back into components
    pub fn from_wire(payload: &[u8]) -> Result<Self> {
        if payload.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Decryption(format!(
                "encrypted payload of {} bytes is shorter than iv+tag",
                payload.len()
            )));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&payload[..IV_LEN]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&payload[IV_LEN..IV_LEN + TAG_LEN]);
        Ok(Self {
            iv,
            tag,
            ciphertext: payload[IV_LEN + TAG_LEN..].to_vec(),
        })
    }
}

/// Encrypt with AES-256-GCM under a fresh random IV
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    // The aead API appends the tag to the ciphertext; the wire format wants
    // it split out, so peel the trailing 16 bytes off.
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM seal failed".into()))?;

    let tag_start = sealed.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    Ok(EncryptedPayload {
        iv,
        tag,
        ciphertext: sealed,
    })
}

/// Decrypt an AES-256-GCM payload
///
/// Length checks run before touching the cipher so a malformed frame is
/// distinguishable from a tampered one.
pub fn decrypt(key: &SessionKey, iv: &[u8], tag: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::InvalidTagLength(tag.len()));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(iv), sealed.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Decrypt straight from the wire layout
pub fn decrypt_wire(key: &SessionKey, payload: &[u8]) -> Result<Vec<u8>> {
    let parts = EncryptedPayload::from_wire(payload)?;
    decrypt(key, &parts.iv, &parts.tag, &parts.ciphertext)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip_arbitrary_plaintext(plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = SessionKey::generate();
            let sealed = encrypt(&key, &plaintext).unwrap();
            let decrypted = decrypt_wire(&key, &sealed.to_wire()).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn any_single_bit_flip_fails_auth(
            plaintext in proptest::collection::vec(any::<u8>(), 1..512),
            bit in 0usize..128,
        ) {
            let key = SessionKey::generate();
            let mut wire = encrypt(&key, &plaintext).unwrap().to_wire();
            let idx = (bit / 8) % wire.len();
            wire[idx] ^= 1 << (bit % 8);
            prop_assert!(decrypt_wire(&key, &wire).is_err());
        }
    }
}
