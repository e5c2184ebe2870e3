//! Chat lifecycle and membership

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use hearth_protocol::model::{Chat, ChatParticipant, ChatRole, ChatType};
use hearth_protocol::payload::{
    AddParticipantRequest, ChatUpdateRequest, CreateChatRequest, RemoveParticipantRequest,
};
use hearth_store::{ChatRepository, StoreError, UserRepository};

use crate::error::{NotFoundKind, ServiceError, ServiceResult};

/// Chat CRUD and participant management
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    users: Arc<dyn UserRepository>,
}

impl ChatService {
    pub fn new(chats: Arc<dyn ChatRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { chats, users }
    }

    async fn load(&self, chat_id: Uuid) -> ServiceResult<Chat> {
        self.chats
            .find_by_id(chat_id)
            .await?
            .ok_or(ServiceError::NotFound(NotFoundKind::Chat))
    }

    async fn require_user_exists(&self, user_id: Uuid) -> ServiceResult<()> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(ServiceError::NotFound(NotFoundKind::User));
        }
        Ok(())
    }

    /// Refresh the stored participant count after a membership change
    async fn refresh_count(&self, chat_id: Uuid) -> ServiceResult<Chat> {
        let mut chat = self.load(chat_id).await?;
        chat.participant_count = self.chats.participant_count(chat_id).await?;
        chat.updated_at = Utc::now();
        Ok(self.chats.save(chat).await?)
    }

    /// Create a chat with the requester as owner
    ///
    /// A private chat between the same two users is deduplicated: the
    /// existing chat is returned instead of creating a twin.
    pub async fn create(&self, requester: Uuid, req: CreateChatRequest) -> ServiceResult<Chat> {
        if req.owner_id != requester {
            return Err(ServiceError::Forbidden("owner must be the requester".into()));
        }

        match req.chat_type {
            ChatType::Group => {
                if req.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(ServiceError::Invalid("group chat needs a name".into()));
                }
            }
            ChatType::Private => {
                let others: Vec<Uuid> = req
                    .member_ids
                    .iter()
                    .copied()
                    .filter(|id| *id != requester)
                    .collect();
                if others.len() != 1 {
                    return Err(ServiceError::Invalid(
                        "private chat needs exactly one other member".into(),
                    ));
                }
                let existing = self.chats.find_private_chats(requester, others[0]).await?;
                if let Some(chat) = existing.into_iter().next() {
                    return Ok(chat);
                }
            }
        }

        for member in &req.member_ids {
            self.require_user_exists(*member).await?;
        }

        let now = Utc::now();
        let chat = Chat {
            chat_id: Uuid::new_v4(),
            chat_type: req.chat_type,
            name: req.name,
            description: req.description,
            owner_id: requester,
            avatar_data: None,
            created_at: now,
            updated_at: now,
            participant_count: 0,
        };
        let chat = self.chats.save(chat).await?;

        self.chats
            .add_participant(ChatParticipant {
                chat_id: chat.chat_id,
                user_id: requester,
                role: ChatRole::Owner,
            })
            .await?;
        for member in req.member_ids {
            if member == requester {
                continue;
            }
            match self
                .chats
                .add_participant(ChatParticipant {
                    chat_id: chat.chat_id,
                    user_id: member,
                    role: ChatRole::Member,
                })
                .await
            {
                Ok(()) | Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.refresh_count(chat.chat_id).await
    }

    /// Chats the user belongs to
    pub async fn list(&self, user_id: Uuid) -> ServiceResult<Vec<Chat>> {
        Ok(self.chats.find_by_user(user_id).await?)
    }

    /// Chat details
    pub async fn info(&self, chat_id: Uuid) -> ServiceResult<Chat> {
        self.load(chat_id).await
    }

    /// Self-join a group chat
    pub async fn join(&self, requester: Uuid, chat_id: Uuid) -> ServiceResult<Chat> {
        let chat = self.load(chat_id).await?;
        if chat.chat_type != ChatType::Group {
            return Err(ServiceError::Invalid("cannot join a private chat".into()));
        }

        self.chats
            .add_participant(ChatParticipant {
                chat_id,
                user_id: requester,
                role: ChatRole::Member,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::Invalid("already a participant".into()),
                other => other.into(),
            })?;

        self.refresh_count(chat_id).await
    }

    /// Self-leave a chat; owners must delete instead
    pub async fn leave(&self, requester: Uuid, chat_id: Uuid) -> ServiceResult<Chat> {
        let chat = self.load(chat_id).await?;
        if chat.owner_id == requester {
            return Err(ServiceError::Forbidden(
                "owner cannot leave; delete the chat instead".into(),
            ));
        }
        self.require_participant(chat_id, requester).await?;
        self.chats.remove_participant(chat_id, requester).await?;
        self.refresh_count(chat_id).await
    }

    /// Update name/description/avatar (owner only)
    pub async fn update(&self, requester: Uuid, req: ChatUpdateRequest) -> ServiceResult<Chat> {
        let mut chat = self.load(req.chat_id).await?;
        if chat.owner_id != requester {
            return Err(ServiceError::Forbidden("only the owner can update a chat".into()));
        }

        if let Some(name) = req.name {
            if chat.chat_type == ChatType::Group && name.trim().is_empty() {
                return Err(ServiceError::Invalid("group chat needs a name".into()));
            }
            chat.name = Some(name);
        }
        if let Some(description) = req.description {
            chat.description = Some(description);
        }
        if let Some(avatar) = req.avatar {
            chat.avatar_data = Some(avatar);
        }
        chat.updated_at = Utc::now();
        Ok(self.chats.save(chat).await?)
    }

    /// Delete a chat and its membership edges (owner only)
    pub async fn delete(&self, requester: Uuid, chat_id: Uuid) -> ServiceResult<Chat> {
        let chat = self.load(chat_id).await?;
        if chat.owner_id != requester {
            return Err(ServiceError::Forbidden("only the owner can delete a chat".into()));
        }
        self.chats.delete(chat_id).await?;
        Ok(chat)
    }

    /// Add a member (owner only); the OWNER role is not grantable
    pub async fn add_participant(
        &self,
        requester: Uuid,
        req: AddParticipantRequest,
    ) -> ServiceResult<Chat> {
        let chat = self.load(req.chat_id).await?;
        if chat.owner_id != requester {
            return Err(ServiceError::Forbidden(
                "only the owner can add participants".into(),
            ));
        }
        if req.role == ChatRole::Owner {
            return Err(ServiceError::Invalid("cannot grant the owner role".into()));
        }
        if chat.chat_type == ChatType::Private {
            return Err(ServiceError::Invalid(
                "cannot add participants to a private chat".into(),
            ));
        }
        self.require_user_exists(req.user_id).await?;

        self.chats
            .add_participant(ChatParticipant {
                chat_id: req.chat_id,
                user_id: req.user_id,
                role: req.role,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::Invalid("already a participant".into()),
                other => other.into(),
            })?;

        self.refresh_count(req.chat_id).await
    }

    /// Remove a member (owner, or the member removing themselves)
    pub async fn remove_participant(
        &self,
        requester: Uuid,
        req: RemoveParticipantRequest,
    ) -> ServiceResult<Chat> {
        let chat = self.load(req.chat_id).await?;
        if chat.owner_id != requester && req.user_id != requester {
            return Err(ServiceError::Forbidden(
                "only the owner can remove other participants".into(),
            ));
        }
        if req.user_id == chat.owner_id {
            return Err(ServiceError::Invalid("the owner cannot be removed".into()));
        }
        self.require_participant(req.chat_id, req.user_id).await?;
        self.chats
            .remove_participant(req.chat_id, req.user_id)
            .await?;
        self.refresh_count(req.chat_id).await
    }

    /// Membership edges for fan-out
    pub async fn participants(&self, chat_id: Uuid) -> ServiceResult<Vec<ChatParticipant>> {
        Ok(self.chats.find_participants(chat_id).await?)
    }

    async fn require_participant(&self, chat_id: Uuid, user_id: Uuid) -> ServiceResult<()> {
        let participants = self.chats.find_participants(chat_id).await?;
        if !participants.iter().any(|p| p.user_id == user_id) {
            return Err(ServiceError::Invalid("not a participant".into()));
        }
        Ok(())
    }
}
