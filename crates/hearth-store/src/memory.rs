//! In-memory repository implementations
//!
//! Hash maps behind `tokio::sync::RwLock`. Suitable for tests and
//! single-node servers; everything is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use hearth_protocol::model::{Chat, ChatParticipant, Message, Session, UserProfile, UserStatus};

use crate::repository::{ChatRepository, MessageRepository, SessionRepository, UserRepository};
use crate::{Result, StoreError};

/// In-memory user store
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, UserProfile>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn save(&self, user: UserProfile) -> Result<UserProfile> {
        let mut users = self.users.write().await;
        let taken = users
            .values()
            .any(|u| u.username == user.username && u.user_id != user.user_id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "username '{}' already registered",
                user.username
            )));
        }
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn search_by_username(&self, query: &str, limit: u32) -> Result<Vec<UserProfile>> {
        let needle = query.to_lowercase();
        let users = self.users.read().await;
        let mut hits: Vec<UserProfile> = users
            .values()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.username.cmp(&b.username));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn find_by_status(&self, status: UserStatus) -> Result<Vec<UserProfile>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.status == status)
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, user_id: Uuid) -> Result<()> {
        self.users.write().await.remove(&user_id);
        Ok(())
    }
}

/// In-memory session store
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn save(&self, session: Session) -> Result<Session> {
        self.sessions
            .write()
            .await
            .insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_expired(&self, before: DateTime<Utc>) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.expires_at < before)
            .cloned()
            .collect())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }
}

/// In-memory chat and participant store
#[derive(Default)]
pub struct MemoryChatRepository {
    chats: RwLock<HashMap<Uuid, Chat>>,
    /// `(chat_id, user_id)` -> edge; uniqueness falls out of the key
    participants: RwLock<HashMap<(Uuid, Uuid), ChatParticipant>>,
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for MemoryChatRepository {
    async fn save(&self, chat: Chat) -> Result<Chat> {
        self.chats.write().await.insert(chat.chat_id, chat.clone());
        Ok(chat)
    }

    async fn find_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        Ok(self.chats.read().await.get(&chat_id).cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let participants = self.participants.read().await;
        let chats = self.chats.read().await;
        let mut result: Vec<Chat> = participants
            .keys()
            .filter(|(_, uid)| *uid == user_id)
            .filter_map(|(cid, _)| chats.get(cid).cloned())
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }

    async fn find_private_chats(&self, a: Uuid, b: Uuid) -> Result<Vec<Chat>> {
        use hearth_protocol::model::ChatType;

        let participants = self.participants.read().await;
        let chats = self.chats.read().await;

        let result = chats
            .values()
            .filter(|c| c.chat_type == ChatType::Private)
            .filter(|c| {
                let members: Vec<Uuid> = participants
                    .keys()
                    .filter(|(cid, _)| *cid == c.chat_id)
                    .map(|(_, uid)| *uid)
                    .collect();
                members.len() == 2 && members.contains(&a) && members.contains(&b)
            })
            .cloned()
            .collect();
        Ok(result)
    }

    async fn add_participant(&self, participant: ChatParticipant) -> Result<()> {
        let key = (participant.chat_id, participant.user_id);
        let mut participants = self.participants.write().await;
        if participants.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "user {} already in chat {}",
                participant.user_id, participant.chat_id
            )));
        }
        participants.insert(key, participant);
        Ok(())
    }

    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        self.participants.write().await.remove(&(chat_id, user_id));
        Ok(())
    }

    async fn find_participants(&self, chat_id: Uuid) -> Result<Vec<ChatParticipant>> {
        Ok(self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn participant_count(&self, chat_id: Uuid) -> Result<u32> {
        Ok(self
            .participants
            .read()
            .await
            .keys()
            .filter(|(cid, _)| *cid == chat_id)
            .count() as u32)
    }

    async fn delete(&self, chat_id: Uuid) -> Result<()> {
        self.chats.write().await.remove(&chat_id);
        self.participants
            .write()
            .await
            .retain(|(cid, _), _| *cid != chat_id);
        Ok(())
    }
}

/// In-memory message store
#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<HashMap<Uuid, Message>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of one chat, newest first
    async fn chat_messages_desc(&self, chat_id: Uuid) -> Vec<Message> {
        let messages = self.messages.read().await;
        let mut result: Vec<Message> = messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn save(&self, message: Message) -> Result<Message> {
        self.messages
            .write()
            .await
            .insert(message.message_id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self.messages.read().await.get(&message_id).cloned())
    }

    async fn find_messages_by_chat(
        &self,
        chat_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut result = self.chat_messages_desc(chat_id).await;
        let start = (offset as usize).min(result.len());
        result.drain(..start);
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn find_messages_before(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let anchor = self
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))?;

        let mut result = self.chat_messages_desc(chat_id).await;
        result.retain(|m| m.created_at < anchor.created_at);
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn add_read_receipt(&self, message_id: Uuid, user_id: Uuid) -> Result<Message> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))?;
        message.mark_read(user_id);
        Ok(message.clone())
    }

    async fn find_unread(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>> {
        let mut result = self.chat_messages_desc(chat_id).await;
        result.retain(|m| !m.read_by.contains(&user_id) && m.sender_id != user_id);
        result.reverse(); // oldest first
        Ok(result)
    }
}
