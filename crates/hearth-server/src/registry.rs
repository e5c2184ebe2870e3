//! Connection registry and fan-out
//!
//! Tracks every live connection's outbound queue plus the side-table
//! `user_id -> connection set` used for server-initiated delivery. The
//! maps are concurrent; inserts and removes are atomic per
//! `(user_id, connection)` pair.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use hearth_protocol::wire::Packet;

/// Identifies one TCP connection for the lifetime of the process
pub type ConnectionId = u64;

/// Outbound queue depth per connection; beyond it writes are dropped
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Sender half of a connection's outbound queue
pub type PacketSender = mpsc::Sender<Packet>;

struct ConnectionEntry {
    sender: PacketSender,
    user_id: Option<Uuid>,
}

/// All live connections and the users bound to them
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    users: DashMap<Uuid, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh connection, returning its id
    pub fn register(&self, sender: PacketSender) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            id,
            ConnectionEntry {
                sender,
                user_id: None,
            },
        );
        id
    }

    /// Bind an authenticated user to a connection
    ///
    /// A connection re-authenticating as a different user is unbound from
    /// the previous one first.
    pub fn bind_user(&self, connection_id: ConnectionId, user_id: Uuid) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            if let Some(previous) = entry.user_id.replace(user_id) {
                self.detach(previous, connection_id);
            }
        }
        self.users.entry(user_id).or_default().insert(connection_id);
    }

    /// Detach a connection from its user without closing it (logout)
    pub fn unbind_user(&self, connection_id: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            if let Some(user_id) = entry.user_id.take() {
                drop(entry);
                self.detach(user_id, connection_id);
            }
        }
    }

    /// Drop a connection, detaching it from its user if any
    pub fn unregister(&self, connection_id: ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(&connection_id) {
            if let Some(user_id) = entry.user_id {
                self.detach(user_id, connection_id);
            }
        }
    }

    fn detach(&self, user_id: Uuid, connection_id: ConnectionId) {
        if let Some(mut set) = self.users.get_mut(&user_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                drop(set);
                self.users.remove(&user_id);
            }
        }
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether the user has at least one live connection
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users
            .get(&user_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Users with at least one live connection
    pub fn online_users(&self) -> Vec<Uuid> {
        self.users.iter().map(|entry| *entry.key()).collect()
    }

    /// The user bound to a connection, if authenticated
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.connections
            .get(&connection_id)
            .and_then(|entry| entry.user_id)
    }

    /// Deliver a packet to every connection of a user, except an optional
    /// excluded connection (the sender's own)
    ///
    /// Best-effort: a connection whose outbound queue is full gets nothing
    /// and is counted as unreachable for this packet.
    pub fn send_to_user(
        &self,
        user_id: Uuid,
        packet: &Packet,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(connection_ids) = self.users.get(&user_id).map(|set| set.value().clone()) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in connection_ids {
            if Some(connection_id) == exclude {
                continue;
            }
            if self.try_send(connection_id, packet.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a packet to every live connection (server broadcast)
    pub fn send_to_all(&self, packet: &Packet) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        let mut delivered = 0;
        for connection_id in ids {
            if self.try_send(connection_id, packet.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn try_send(&self, connection_id: ConnectionId, packet: Packet) -> bool {
        let Some(entry) = self.connections.get(&connection_id) else {
            return false;
        };
        match entry.sender.try_send(packet) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(packet)) => {
                warn!(
                    connection_id,
                    message_type = ?packet.message_type,
                    "outbound queue full, dropping packet"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id, "send to closed connection");
                false
            }
        }
    }
}
