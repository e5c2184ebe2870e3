//! RSA-OAEP key transport
//!
//! Used only during the handshake: the server publishes its DER-encoded
//! public key and the client answers with the session key wrapped under
//! RSA-OAEP (SHA-256 digest and MGF1). The type system keeps the key
//! kinds honest — encryption takes an [`RsaPublicKey`], unwrapping takes
//! the private half.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::key::SessionKey;
use crate::{CryptoError, Result};

/// RSA modulus size for server keypairs
pub const RSA_KEY_BITS: usize = 4096;

/// The server's long-lived keypair
///
/// Generated once at boot and immutable afterwards; readers share it
/// without locking.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl ServerKeyPair {
    /// Generate a fresh keypair of the given modulus size
    ///
    /// 4096-bit generation takes seconds; callers run it once at startup
    /// (or on a blocking thread).
    pub fn generate(bits: usize) -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The public half
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// DER (SubjectPublicKeyInfo) encoding of the public key, as sent in
    /// the handshake response
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::Encryption(format!("DER encode: {}", e)))?;
        Ok(der.as_bytes().to_vec())
    }

    /// Recover a session key wrapped to our public key
    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<SessionKey> {
        let plain = self
            .private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Handshake(format!("OAEP unwrap: {}", e)))?;
        SessionKey::from_bytes(&plain)
            .map_err(|_| CryptoError::Handshake(format!("wrapped key has {} bytes", plain.len())))
    }
}

/// Parse a peer's DER-encoded public key
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::Handshake(format!("DER decode: {}", e)))
}

/// Wrap a session key to a recipient's public key
pub fn wrap_session_key(recipient: &RsaPublicKey, key: &SessionKey) -> Result<Vec<u8>> {
    let mut rng = OsRng;
    recipient
        .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("OAEP wrap: {}", e)))
}
