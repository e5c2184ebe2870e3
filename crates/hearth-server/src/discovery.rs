//! UDP multicast discovery
//!
//! The broadcaster announces this server on the LAN once per interval,
//! independent of the TCP accept loop. The listener is the client half:
//! it joins the group, collects announcements and keeps the recent ones.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hearth_protocol::discovery::{DiscoveryPacket, ServerState};

use crate::config::ServerConfig;
use crate::server::ServerCore;

/// Multicast TTL for announcements (a few router hops)
const MULTICAST_TTL: u32 = 4;

/// Build the announcement for the current server state
pub fn advertisement(config: &ServerConfig, server_id: Uuid, current_users: u32) -> DiscoveryPacket {
    let state = if current_users >= config.max_users {
        ServerState::Full
    } else {
        ServerState::Active
    };
    DiscoveryPacket {
        server_id,
        server_name: config.server_name.clone(),
        address: config.host.clone(),
        port: config.port,
        version: env!("CARGO_PKG_VERSION").to_string(),
        max_users: config.max_users,
        current_users,
        encryption_required: config.encryption.required,
        encryption_type: if config.encryption.required {
            Some(config.encryption.default_plugin.clone())
        } else {
            None
        },
        state,
    }
}

/// Start the periodic broadcaster; abort the handle to stop it
pub fn spawn_broadcaster(core: Arc<ServerCore>, server_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let group: Ipv4Addr = match core.config.discovery.multicast_address.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(
                    address = %core.config.discovery.multicast_address,
                    error = %e,
                    "invalid multicast address, discovery disabled"
                );
                return;
            }
        };
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "discovery socket bind failed");
                return;
            }
        };
        if let Err(e) = socket.set_multicast_ttl_v4(MULTICAST_TTL) {
            warn!(error = %e, "multicast TTL not set");
        }

        let target = (group, core.config.discovery.port);
        let interval = Duration::from_secs(core.config.discovery.broadcast_interval_secs);
        info!(
            group = %group,
            port = core.config.discovery.port,
            interval_secs = interval.as_secs(),
            "discovery broadcaster started"
        );

        loop {
            let current_users = core.registry.connection_count() as u32;
            let packet = advertisement(&core.config, server_id, current_users);
            match serde_json::to_vec(&packet) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, target).await {
                        warn!(error = %e, "discovery send failed");
                    } else {
                        debug!(current_users, state = ?packet.state, "discovery announcement sent");
                    }
                }
                Err(e) => warn!(error = %e, "discovery serialize failed"),
            }
            tokio::time::sleep(interval).await;
        }
    })
}

/// Client-side collector of discovery announcements
pub struct DiscoveryListener {
    socket: UdpSocket,
    servers: HashMap<Uuid, (DiscoveryPacket, DateTime<Utc>)>,
}

impl DiscoveryListener {
    /// Join the multicast group and listen on the discovery port
    pub async fn bind(multicast_address: &str, port: u16) -> std::io::Result<Self> {
        let group: Ipv4Addr = multicast_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}", e)))?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        Ok(Self {
            socket,
            servers: HashMap::new(),
        })
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait up to `wait` for one announcement; invalid datagrams are
    /// dropped silently
    pub async fn poll(&mut self, wait: Duration) -> Option<DiscoveryPacket> {
        let mut buf = [0u8; 2048];
        let (len, from) = tokio::time::timeout(wait, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;

        let packet: DiscoveryPacket = match serde_json::from_slice(&buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                debug!(from = %from, error = %e, "undecodable discovery datagram");
                return None;
            }
        };
        if packet.validate().is_err() {
            debug!(from = %from, "invalid discovery packet dropped");
            return None;
        }

        self.servers
            .insert(packet.server_id, (packet.clone(), Utc::now()));
        Some(packet)
    }

    /// Servers heard from within the recency window, pruning the rest
    pub fn recent(&mut self) -> Vec<DiscoveryPacket> {
        let now = Utc::now();
        self.servers
            .retain(|_, (_, received)| DiscoveryPacket::is_recent(*received, now));
        self.servers.values().map(|(p, _)| p.clone()).collect()
    }
}
