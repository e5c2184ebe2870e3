//! Server assembly and accept loop

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use hearth_crypto::asymmetric::ServerKeyPair;
use hearth_crypto::plugin::PluginRegistry;
use hearth_protocol::payload::{self, BroadcastNotice};
use hearth_protocol::wire::{MessageType, Packet};
use hearth_store::{
    ChatRepository, MemoryChatRepository, MemoryMessageRepository, MemorySessionRepository,
    MemoryUserRepository, MessageRepository, SessionRepository, UserRepository,
};

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::discovery::spawn_broadcaster;
use crate::dispatcher::Dispatcher;
use crate::rate_limit::RateLimiter;
use crate::registry::ConnectionRegistry;
use crate::services::{AuthService, ChatService, MessageService, UserService};
use crate::session::SessionManager;

/// How often expired sessions are collected
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Sessions stay queryable this long past expiry before deletion
const SESSION_CLEANUP_GRACE_SECS: u64 = 300;

/// Rate-limiter state is pruned every this many accepts
const LIMITER_PRUNE_EVERY: u64 = 1024;

/// The repository set the server runs on
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

impl Repositories {
    /// Volatile in-memory stores (tests, single-node evaluation)
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::new()),
            sessions: Arc::new(MemorySessionRepository::new()),
            chats: Arc::new(MemoryChatRepository::new()),
            messages: Arc::new(MemoryMessageRepository::new()),
        }
    }
}

/// Shared immutable server state handed to every connection
pub struct ServerCore {
    pub config: ServerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Dispatcher,
    pub keypair: Arc<ServerKeyPair>,
    pub plugins: PluginRegistry,
    pub sessions: Arc<SessionManager>,
    /// Used by connection teardown to flip presence to OFFLINE
    pub users: UserService,
}

/// The Hearth chat server
pub struct ChatServer {
    core: Arc<ServerCore>,
    server_id: Uuid,
}

impl ChatServer {
    /// Build a server over in-memory repositories
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        Self::with_repositories(config, Repositories::in_memory()).await
    }

    /// Build a server over the given repositories
    ///
    /// Generates the boot RSA keypair, which takes a while for 4096-bit
    /// moduli; runs on a blocking thread.
    pub async fn with_repositories(
        mut config: ServerConfig,
        repos: Repositories,
    ) -> anyhow::Result<Self> {
        config.validate();

        let bits = config.encryption.rsa_key_size;
        info!(bits, "generating server RSA keypair");
        let keypair = tokio::task::spawn_blocking(move || ServerKeyPair::generate(bits)).await??;

        let registry = Arc::new(ConnectionRegistry::new());
        let sessions = Arc::new(SessionManager::new(
            config.session.secret.clone(),
            config.session.token_expiration_seconds,
            Arc::clone(&repos.sessions),
        ));

        let auth = AuthService::new(Arc::clone(&repos.users), Arc::clone(&sessions));
        let user_service = UserService::new(Arc::clone(&repos.users));
        let chat_service = ChatService::new(Arc::clone(&repos.chats), Arc::clone(&repos.users));
        let message_service =
            MessageService::new(Arc::clone(&repos.messages), Arc::clone(&repos.chats));
        let dispatcher = Dispatcher::new(
            auth,
            user_service,
            chat_service,
            message_service,
            Arc::clone(&sessions),
            Arc::clone(&registry),
        );

        let mut plugins = PluginRegistry::with_builtins();
        if let Err(e) = plugins.set_default(&config.encryption.default_plugin) {
            warn!(error = %e, "unknown default_plugin, keeping AES-256-GCM");
        }

        let core = Arc::new(ServerCore {
            users: UserService::new(Arc::clone(&repos.users)),
            config,
            registry,
            dispatcher,
            keypair: Arc::new(keypair),
            plugins,
            sessions,
        });

        Ok(Self {
            core,
            server_id: Uuid::new_v4(),
        })
    }

    /// This boot's discovery identity
    pub fn server_id(&self) -> Uuid {
        self.server_id
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.core.config.bind_addr()).await?;
        info!(addr = %listener.local_addr()?, "listening");
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let broadcaster: Option<JoinHandle<()>> = if self.core.config.discovery.enabled {
            Some(spawn_broadcaster(Arc::clone(&self.core), self.server_id))
        } else {
            None
        };
        let cleanup = self.spawn_session_cleanup();

        let mut limiter = RateLimiter::new(self.core.config.rate_limit);
        let mut accepted: u64 = 0;

        let result = loop {
            let (stream, addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => break Err(anyhow::Error::from(e)),
            };

            accepted += 1;
            if accepted % LIMITER_PRUNE_EVERY == 0 {
                limiter.prune();
            }
            if !limiter.check(addr.ip()) {
                warn!(remote = %addr, "connection rate limit exceeded");
                continue;
            }

            if self.core.registry.connection_count() >= self.core.config.max_connections {
                warn!(remote = %addr, "connection limit reached, refusing");
                continue;
            }

            info!(remote = %addr, "accepted connection");
            let core = Arc::clone(&self.core);
            tokio::spawn(handle_connection(core, stream, addr));
        };

        if let Some(handle) = broadcaster {
            handle.abort();
        }
        cleanup.abort();
        result
    }

    fn spawn_session_cleanup(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.core.sessions);
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(std::time::Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
            // The first tick fires immediately; skip it
            tick.tick().await;
            loop {
                tick.tick().await;
                match sessions.cleanup_expired(SESSION_CLEANUP_GRACE_SECS).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "expired sessions collected"),
                    Err(e) => warn!(error = %e, "session cleanup failed"),
                }
            }
        })
    }

    /// Push an operator notice to every connection
    pub fn broadcast(&self, message: impl Into<String>) -> usize {
        let notice = BroadcastNotice {
            message: message.into(),
        };
        let bytes = payload::to_bytes(&notice).unwrap_or_default();
        let packet = Packet::new(MessageType::Broadcast, rand::random::<u64>(), bytes);
        self.core.registry.send_to_all(&packet)
    }

    /// Warn every connection the server is going down
    pub fn announce_shutdown(&self) -> usize {
        let packet = Packet::new(
            MessageType::ServerShutdown,
            rand::random::<u64>(),
            bytes::Bytes::new(),
        );
        self.core.registry.send_to_all(&packet)
    }
}
