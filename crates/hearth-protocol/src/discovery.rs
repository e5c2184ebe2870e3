//! LAN discovery datagram format
//!
//! Servers advertise themselves by multicasting one JSON datagram per
//! broadcast interval. Listeners keep packets received within the last
//! 60 seconds and drop the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ProtocolError, Result};

/// How long a received announcement stays fresh
pub const RECENCY_WINDOW_SECS: i64 = 60;

/// Advertised server availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerState {
    Active,
    Maintenance,
    Full,
}

/// One discovery announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPacket {
    pub server_id: Uuid,
    pub server_name: String,
    /// Address clients should connect to (TCP)
    pub address: String,
    pub port: u16,
    pub version: String,
    pub max_users: u32,
    pub current_users: u32,
    pub encryption_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_type: Option<String>,
    pub state: ServerState,
}

impl DiscoveryPacket {
    /// Structural validation of a received announcement
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ProtocolError::InvalidPayload(
                "discovery port must be in [1, 65535]".into(),
            ));
        }
        if self.max_users == 0 {
            return Err(ProtocolError::InvalidPayload(
                "discovery maxUsers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether a packet received at `received_at` is still fresh at `now`
    pub fn is_recent(received_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - received_at).num_seconds() < RECENCY_WINDOW_SECS
    }
}
