//! Message persistence and history

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use hearth_protocol::model::Message;
use hearth_protocol::payload::{EditMessageRequest, HistoryRequest, SendMessageRequest};
use hearth_store::{ChatRepository, MessageRepository};

use crate::error::{NotFoundKind, ServiceError, ServiceResult};

/// History pages are capped regardless of the requested limit
const MAX_HISTORY_PAGE: u32 = 500;

/// Message CRUD over the message repository
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    chats: Arc<dyn ChatRepository>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageRepository>, chats: Arc<dyn ChatRepository>) -> Self {
        Self { messages, chats }
    }

    async fn load(&self, message_id: Uuid) -> ServiceResult<Message> {
        self.messages
            .find_by_id(message_id)
            .await?
            .ok_or(ServiceError::NotFound(NotFoundKind::Message))
    }

    /// Persist a message draft
    pub async fn send(&self, requester: Uuid, req: SendMessageRequest) -> ServiceResult<Message> {
        if req.sender_id != requester {
            return Err(ServiceError::Forbidden(
                "senderId must match the authenticated user".into(),
            ));
        }
        if req.content.is_empty() {
            return Err(ServiceError::Invalid("message content is empty".into()));
        }

        let message = Message {
            message_id: Uuid::new_v4(),
            chat_id: req.chat_id,
            sender_id: req.sender_id,
            content: req.content,
            message_type: req.message_type,
            reply_to: req.reply_to,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
            read_by: Default::default(),
        };
        Ok(self.messages.save(message).await?)
    }

    /// Newest-first history page, either offset- or anchor-based
    pub async fn history(&self, req: HistoryRequest) -> ServiceResult<Vec<Message>> {
        let limit = req.limit.min(MAX_HISTORY_PAGE);
        let page = match req.before_message_id {
            Some(anchor) => self
                .messages
                .find_messages_before(req.chat_id, anchor, limit)
                .await
                .map_err(|e| match e {
                    hearth_store::StoreError::NotFound(_) => {
                        ServiceError::NotFound(NotFoundKind::Message)
                    }
                    other => other.into(),
                })?,
            None => {
                self.messages
                    .find_messages_by_chat(req.chat_id, limit, req.offset.unwrap_or(0))
                    .await?
            }
        };
        Ok(page)
    }

    /// Edit message content (sender only)
    pub async fn edit(&self, requester: Uuid, req: EditMessageRequest) -> ServiceResult<Message> {
        if req.new_content.is_empty() {
            return Err(ServiceError::Invalid("message content is empty".into()));
        }
        let mut message = self.load(req.message_id).await?;
        if message.sender_id != requester {
            return Err(ServiceError::Forbidden("only the sender can edit".into()));
        }
        if message.is_deleted() {
            return Err(ServiceError::Invalid("cannot edit a deleted message".into()));
        }

        message.content = req.new_content;
        message.edited_at = Some(Utc::now());
        Ok(self.messages.save(message).await?)
    }

    /// Tombstone a message (sender, or the chat owner)
    pub async fn delete(&self, requester: Uuid, message_id: Uuid) -> ServiceResult<Message> {
        let mut message = self.load(message_id).await?;

        if message.sender_id != requester {
            let owner = self
                .chats
                .find_by_id(message.chat_id)
                .await?
                .map(|chat| chat.owner_id);
            if owner != Some(requester) {
                return Err(ServiceError::Forbidden(
                    "only the sender or the chat owner can delete".into(),
                ));
            }
        }
        if message.is_deleted() {
            return Ok(message);
        }

        message.tombstone(Utc::now());
        Ok(self.messages.save(message).await?)
    }

    /// Record a read receipt (idempotent)
    pub async fn mark_read(&self, requester: Uuid, message_id: Uuid) -> ServiceResult<Message> {
        // Existence check gives a proper MESSAGE_NOT_FOUND
        self.load(message_id).await?;
        Ok(self.messages.add_read_receipt(message_id, requester).await?)
    }

    /// Unread messages for a user in a chat, oldest first
    pub async fn unread(&self, requester: Uuid, chat_id: Uuid) -> ServiceResult<Vec<Message>> {
        Ok(self.messages.find_unread(chat_id, requester).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_protocol::model::{Chat, ChatType, MessageKind};
    use hearth_store::{MemoryChatRepository, MemoryMessageRepository};

    struct Fixture {
        service: MessageService,
        alice: Uuid,
        bob: Uuid,
        chat_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let chats = Arc::new(MemoryChatRepository::new());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();
        let chat = chats
            .save(Chat {
                chat_id: Uuid::new_v4(),
                chat_type: ChatType::Group,
                name: Some("room".into()),
                description: None,
                owner_id: alice,
                avatar_data: None,
                created_at: now,
                updated_at: now,
                participant_count: 2,
            })
            .await
            .unwrap();
        Fixture {
            service: MessageService::new(Arc::new(MemoryMessageRepository::new()), chats),
            alice,
            bob,
            chat_id: chat.chat_id,
        }
    }

    fn send_req(chat_id: Uuid, sender: Uuid, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            chat_id,
            sender_id: sender,
            content: content.into(),
            message_type: MessageKind::Text,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn test_send_stamps_id_and_time() {
        let f = fixture().await;
        let stored = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "hi"))
            .await
            .unwrap();
        assert_eq!(stored.content, "hi");
        assert!(stored.edited_at.is_none());
        assert!(!stored.is_deleted());
    }

    #[tokio::test]
    async fn test_send_sender_mismatch() {
        let f = fixture().await;
        assert!(matches!(
            f.service.send(f.alice, send_req(f.chat_id, f.bob, "hi")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_send_empty_content() {
        let f = fixture().await;
        assert!(matches!(
            f.service.send(f.bob, send_req(f.chat_id, f.bob, "")).await,
            Err(ServiceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_sender_only() {
        let f = fixture().await;
        let stored = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "first"))
            .await
            .unwrap();

        assert!(matches!(
            f.service
                .edit(
                    f.alice,
                    EditMessageRequest {
                        message_id: stored.message_id,
                        new_content: "hacked".into(),
                    }
                )
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        let edited = f
            .service
            .edit(
                f.bob,
                EditMessageRequest {
                    message_id: stored.message_id,
                    new_content: "second".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.content, "second");
        assert!(edited.edited_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_by_sender_and_by_owner() {
        let f = fixture().await;

        // Sender deletes own message
        let m1 = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "one"))
            .await
            .unwrap();
        let deleted = f.service.delete(f.bob, m1.message_id).await.unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(deleted.content, hearth_protocol::model::DELETED_CONTENT);

        // Chat owner (alice) deletes bob's message
        let m2 = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "two"))
            .await
            .unwrap();
        f.service.delete(f.alice, m2.message_id).await.unwrap();

        // A third party cannot
        let m3 = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "three"))
            .await
            .unwrap();
        assert!(matches!(
            f.service.delete(Uuid::new_v4(), m3.message_id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_message_cannot_be_edited() {
        let f = fixture().await;
        let stored = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "soon gone"))
            .await
            .unwrap();
        f.service.delete(f.bob, stored.message_id).await.unwrap();

        assert!(matches!(
            f.service
                .edit(
                    f.bob,
                    EditMessageRequest {
                        message_id: stored.message_id,
                        new_content: "resurrect".into(),
                    }
                )
                .await,
            Err(ServiceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let f = fixture().await;
        for i in 0..5 {
            f.service
                .send(f.bob, send_req(f.chat_id, f.bob, &format!("m{}", i)))
                .await
                .unwrap();
            // Keep created_at strictly increasing
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let page = f
            .service
            .history(HistoryRequest {
                chat_id: f.chat_id,
                limit: 3,
                offset: None,
                before_message_id: None,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].content, "m4");
        assert_eq!(page[2].content, "m2");

        let older = f
            .service
            .history(HistoryRequest {
                chat_id: f.chat_id,
                limit: 10,
                offset: None,
                before_message_id: Some(page[2].message_id),
            })
            .await
            .unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[0].content, "m1");
    }

    #[tokio::test]
    async fn test_mark_read_idempotent() {
        let f = fixture().await;
        let stored = f
            .service
            .send(f.bob, send_req(f.chat_id, f.bob, "read me"))
            .await
            .unwrap();

        let first = f.service.mark_read(f.alice, stored.message_id).await.unwrap();
        let second = f.service.mark_read(f.alice, stored.message_id).await.unwrap();
        assert_eq!(first.read_by, second.read_by);
        assert!(second.read_by.contains(&f.alice));
    }

    #[tokio::test]
    async fn test_mark_read_unknown_message() {
        let f = fixture().await;
        assert!(matches!(
            f.service.mark_read(f.alice, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(NotFoundKind::Message))
        ));
    }
}
