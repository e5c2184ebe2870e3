//! Encryption plugin abstraction
//!
//! The server selects algorithms by name through a registry rather than
//! hard-wiring them, so a deployment can pin `default_plugin` in its
//! config and future algorithms slot in without touching the pipeline.
//! Plugins are stateless values; per-connection key material stays with
//! the connection that owns it.

use std::collections::HashMap;
use std::sync::Arc;

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::key::{SessionKey, SESSION_KEY_LEN};
use crate::{symmetric, CryptoError, Result};

/// Whether a plugin encrypts with a shared or a split key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Symmetric,
    Asymmetric,
}

/// A pluggable encryption algorithm
///
/// `encrypt`/`decrypt` operate on the algorithm's wire form: for the
/// symmetric plugin that is `iv ∥ tag ∥ ciphertext`, for the asymmetric
/// plugin the raw OAEP ciphertext. Key bytes are the algorithm's native
/// encoding (raw 32 bytes for AES, DER for RSA).
pub trait EncryptionPlugin: Send + Sync {
    /// Registry name, e.g. `"AES-256-GCM"`
    fn name(&self) -> &'static str;

    /// Plugin implementation version
    fn version(&self) -> &'static str;

    /// Symmetric or asymmetric
    fn kind(&self) -> AlgorithmKind;

    /// Generate key material in the plugin's native encoding
    fn generate_key(&self) -> Result<Vec<u8>>;

    /// Encrypt a plaintext under the given key
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a wire payload under the given key
    fn decrypt(&self, key: &[u8], payload: &[u8]) -> Result<Vec<u8>>;

    /// Whether the bytes are usable key material for this plugin
    fn is_key_valid(&self, key: &[u8]) -> bool;
}

/// AES-256-GCM session encryption plugin
#[derive(Debug, Default)]
pub struct AesGcmPlugin;

impl EncryptionPlugin for AesGcmPlugin {
    fn name(&self) -> &'static str {
        "AES-256-GCM"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Symmetric
    }

    fn generate_key(&self) -> Result<Vec<u8>> {
        Ok(SessionKey::generate().as_bytes().to_vec())
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = SessionKey::from_bytes(key)?;
        Ok(symmetric::encrypt(&key, plaintext)?.to_wire())
    }

    fn decrypt(&self, key: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let key = SessionKey::from_bytes(key)?;
        symmetric::decrypt_wire(&key, payload)
    }

    fn is_key_valid(&self, key: &[u8]) -> bool {
        key.len() == SESSION_KEY_LEN
    }
}

/// RSA-OAEP key transport plugin
///
/// Encrypt takes a DER (SPKI) public key; decrypt takes a DER (PKCS#8)
/// private key. Handing the wrong kind to either side fails to parse.
#[derive(Debug, Default)]
pub struct RsaOaepPlugin;

impl EncryptionPlugin for RsaOaepPlugin {
    fn name(&self) -> &'static str {
        "RSA-OAEP"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Asymmetric
    }

    fn generate_key(&self) -> Result<Vec<u8>> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, crate::asymmetric::RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let der = private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let public = RsaPublicKey::from_public_key_der(key)
            .map_err(|e| CryptoError::InvalidKey(format!("not an RSA public key: {}", e)))?;
        public
            .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn decrypt(&self, key: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let private = RsaPrivateKey::from_pkcs8_der(key)
            .map_err(|e| CryptoError::InvalidKey(format!("not an RSA private key: {}", e)))?;
        private
            .decrypt(Oaep::new::<Sha256>(), payload)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn is_key_valid(&self, key: &[u8]) -> bool {
        RsaPublicKey::from_public_key_der(key).is_ok()
            || RsaPrivateKey::from_pkcs8_der(key).is_ok()
    }
}

/// Name-indexed plugin registry
///
/// Owned by the server; shared read-only across connections.
pub struct PluginRegistry {
    plugins: HashMap<&'static str, Arc<dyn EncryptionPlugin>>,
    default_name: &'static str,
}

impl PluginRegistry {
    /// Registry with the built-in plugins, AES-GCM as default
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            plugins: HashMap::new(),
            default_name: "AES-256-GCM",
        };
        registry.register(Arc::new(AesGcmPlugin));
        registry.register(Arc::new(RsaOaepPlugin));
        registry
    }

    /// Register a plugin under its own name
    pub fn register(&mut self, plugin: Arc<dyn EncryptionPlugin>) {
        self.plugins.insert(plugin.name(), plugin);
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn EncryptionPlugin>> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownPlugin(name.to_string()))
    }

    /// The configured default plugin
    pub fn default_plugin(&self) -> Arc<dyn EncryptionPlugin> {
        self.plugins[self.default_name].clone()
    }

    /// Set the default plugin name; fails if unregistered
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        match self.plugins.get_key_value(name) {
            Some((key, _)) => {
                self.default_name = *key;
                Ok(())
            }
            None => Err(CryptoError::UnknownPlugin(name.to_string())),
        }
    }

    /// Registered plugin names
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }
}
