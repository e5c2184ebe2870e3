//! Stored chat message entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Content replacing a deleted message
pub const DELETED_CONTENT: &str = "[deleted]";

/// What kind of content a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
    System,
}

/// A message persisted in a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    /// Non-empty unless the message was deleted
    pub content: String,
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Users that have read this message (ordered for stable JSON)
    #[serde(default)]
    pub read_by: BTreeSet<Uuid>,
}

impl Message {
    /// Whether the message has been tombstoned
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record a read receipt; returns false if the user had already read it
    pub fn mark_read(&mut self, user_id: Uuid) -> bool {
        self.read_by.insert(user_id)
    }

    /// Replace the content with the deletion sentinel
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.content = DELETED_CONTENT.to_string();
        self.deleted_at = Some(at);
    }
}
