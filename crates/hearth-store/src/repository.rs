//! Repository contracts consumed by the server core
//!
//! Implementations are free to back these with any store; the in-memory
//! variants in [`crate::memory`] are the reference. All methods are
//! upserts unless stated otherwise, and "newest-first" always means
//! descending `created_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hearth_protocol::model::{Chat, ChatParticipant, Message, Session, UserProfile, UserStatus};

use crate::Result;

/// User account storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or update a profile; fails with `Conflict` if the username
    /// is taken by a different user
    async fn save(&self, user: UserProfile) -> Result<UserProfile>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserProfile>>;

    /// Case-insensitive substring search over usernames
    async fn search_by_username(&self, query: &str, limit: u32) -> Result<Vec<UserProfile>>;

    async fn find_by_status(&self, status: UserStatus) -> Result<Vec<UserProfile>>;

    async fn delete_by_id(&self, user_id: Uuid) -> Result<()>;
}

/// Login session storage
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: Session) -> Result<Session>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Session>>;

    /// Sessions whose `expires_at` is strictly before the cutoff
    async fn find_expired(&self, before: DateTime<Utc>) -> Result<Vec<Session>>;

    async fn delete(&self, session_id: Uuid) -> Result<()>;
}

/// Chat and participant storage
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn save(&self, chat: Chat) -> Result<Chat>;

    async fn find_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>>;

    /// Chats the user participates in
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Chat>>;

    /// Private chats whose participant set is exactly `{a, b}`
    async fn find_private_chats(&self, a: Uuid, b: Uuid) -> Result<Vec<Chat>>;

    /// Fails with `Conflict` if the edge already exists
    async fn add_participant(&self, participant: ChatParticipant) -> Result<()>;

    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<()>;

    async fn find_participants(&self, chat_id: Uuid) -> Result<Vec<ChatParticipant>>;

    async fn participant_count(&self, chat_id: Uuid) -> Result<u32>;

    async fn delete(&self, chat_id: Uuid) -> Result<()>;
}

/// Message storage
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: Message) -> Result<Message>;

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>>;

    /// Newest-first page of a chat's messages
    async fn find_messages_by_chat(
        &self,
        chat_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>>;

    /// Newest-first messages older than the given anchor message
    async fn find_messages_before(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Message>>;

    /// Record a read receipt; a repeat from the same user is a no-op.
    /// Returns the updated message.
    async fn add_read_receipt(&self, message_id: Uuid, user_id: Uuid) -> Result<Message>;

    /// Messages in the chat the user has not read, oldest first
    async fn find_unread(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>>;
}
