//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Name advertised in discovery packets
    pub server_name: String,
    /// Advertised capacity; at or above it the server reports FULL
    pub max_users: u32,
    /// Hard cap on concurrent TCP connections
    pub max_connections: usize,
    /// Connection is closed after this long without an inbound frame
    pub read_timeout_secs: u64,
    /// Interval clients are expected to PING at
    pub heartbeat_interval_secs: u64,
    /// Accepted connections per second per source IP
    pub rate_limit: u32,
    pub discovery: DiscoveryConfig,
    pub database: DatabaseConfig,
    pub encryption: EncryptionConfig,
    pub session: SessionConfig,
}

/// UDP multicast discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub multicast_address: String,
    pub port: u16,
    pub broadcast_interval_secs: u64,
}

/// Persistence settings (consumed by repository implementations)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database location; in-memory stores are used when absent
    pub path: Option<String>,
    pub connection_pool_size: u32,
}

/// Application-layer encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// When true, non-handshake traffic must be encrypted once a client
    /// could have completed the handshake
    pub required: bool,
    pub default_plugin: String,
    pub rsa_key_size: usize,
    pub aes_key_size: usize,
}

/// Session token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub token_expiration_seconds: u64,
    pub refresh_token_expiration_days: u64,
    /// HMAC secret; generated at boot when absent
    pub secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            server_name: "hearth".to_string(),
            max_users: 1000,
            max_connections: 10_000,
            read_timeout_secs: 60,
            heartbeat_interval_secs: 30,
            rate_limit: 100,
            discovery: DiscoveryConfig::default(),
            database: DatabaseConfig::default(),
            encryption: EncryptionConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            multicast_address: "239.255.255.250".to_string(),
            port: 9999,
            broadcast_interval_secs: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            connection_pool_size: 10,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            required: true,
            default_plugin: "AES-256-GCM".to_string(),
            rsa_key_size: 4096,
            aes_key_size: 256,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_expiration_seconds: 3600,
            refresh_token_expiration_days: 30,
            secret: None,
        }
    }
}

impl ServerConfig {
    /// Minimum broadcast interval (prevents accidental zero = busy loop)
    const MIN_BROADCAST_INTERVAL: u64 = 1;

    /// Minimum accepted RSA modulus
    const MIN_RSA_BITS: usize = 2048;

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: ServerConfig = toml::from_str(&raw)?;
        config.validate();
        Ok(config)
    }

    /// Clamp out-of-range values rather than refusing to start
    pub fn validate(&mut self) {
        if self.discovery.broadcast_interval_secs < Self::MIN_BROADCAST_INTERVAL {
            self.discovery.broadcast_interval_secs = Self::MIN_BROADCAST_INTERVAL;
        }
        if self.encryption.rsa_key_size < Self::MIN_RSA_BITS {
            tracing::warn!(
                "rsa_key_size {} below minimum, using {}",
                self.encryption.rsa_key_size,
                Self::MIN_RSA_BITS
            );
            self.encryption.rsa_key_size = Self::MIN_RSA_BITS;
        }
        if self.max_users == 0 {
            self.max_users = 1;
        }
        if self.read_timeout_secs == 0 {
            self.read_timeout_secs = 60;
        }
        if self.discovery.port == 0 {
            tracing::warn!("invalid discovery port 0, disabling discovery");
            self.discovery.enabled = false;
        }
    }

    /// `host:port` bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(!config.discovery.enabled);
        assert_eq!(config.discovery.multicast_address, "239.255.255.250");
        assert_eq!(config.discovery.port, 9999);
        assert_eq!(config.discovery.broadcast_interval_secs, 5);
        assert_eq!(config.database.connection_pool_size, 10);
        assert!(config.encryption.required);
        assert_eq!(config.encryption.default_plugin, "AES-256-GCM");
        assert_eq!(config.encryption.rsa_key_size, 4096);
        assert_eq!(config.encryption.aes_key_size, 256);
        assert_eq!(config.session.token_expiration_seconds, 3600);
        assert_eq!(config.session.refresh_token_expiration_days, 30);
        assert_eq!(config.read_timeout_secs, 60);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            port = 9000

            [encryption]
            required = false
        "#;
        let config: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.port, 9000);
        assert!(!config.encryption.required);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.session.token_expiration_seconds, 3600);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = ServerConfig::default();
        config.discovery.broadcast_interval_secs = 0;
        config.encryption.rsa_key_size = 512;
        config.max_users = 0;
        config.validate();
        assert_eq!(config.discovery.broadcast_interval_secs, 1);
        assert_eq!(config.encryption.rsa_key_size, 2048);
        assert_eq!(config.max_users, 1);
    }
}
