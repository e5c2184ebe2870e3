//! Request/response payload bodies
//!
//! Each `*_REQ`/`*_RES` frame carries one of these JSON bodies. Field
//! names follow the wire convention (camelCase); all bodies round-trip
//! through [`to_bytes`]/[`from_bytes`].

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ChatRole, ChatType, MessageKind, UserStatus};
use crate::{ProtocolError, Result};

/// Serialize a payload body to frame bytes
pub fn to_bytes<T: Serialize>(body: &T) -> Result<Bytes> {
    let vec = serde_json::to_vec(body)
        .map_err(|e| ProtocolError::InvalidPayload(format!("serialize: {}", e)))?;
    Ok(Bytes::from(vec))
}

/// Parse a payload body from frame bytes
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::InvalidPayload(format!("deserialize: {}", e)))
}

/// Machine-readable failure codes carried in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthenticated,
    AuthFailed,
    SessionExpired,
    Forbidden,
    InvalidRequest,
    UserNotFound,
    ChatNotFound,
    MessageNotFound,
    InternalError,
}

/// Body of every failed `*_RES`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description, never a stack trace
    pub error: String,
    pub code: ErrorCode,
}

impl ErrorBody {
    /// Build an error body
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

/// Generic success acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    /// The affirmative acknowledgement
    pub const OK: Ack = Ack { ok: true };
}

// --- auth ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    /// Plaintext password; hashed server-side, never stored
    pub password: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub old_password: String,
    pub new_password: String,
}

// --- users ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdBody {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Base64 image bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarSetRequest {
    /// Base64 image bytes
    pub avatar_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarBody {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_data: Option<String>,
}

// --- chats ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub chat_type: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: Uuid,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIdBody {
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdateRequest {
    pub chat_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub role: ChatRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParticipantRequest {
    pub chat_id: Uuid,
    pub user_id: Uuid,
}

// --- messaging ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub chat_id: Uuid,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub message_id: Uuid,
    pub new_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageIdBody {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicatorBody {
    pub chat_id: Uuid,
    pub user_id: Uuid,
}

// --- system ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastNotice {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_wire_shape() {
        let body = ErrorBody::new(ErrorCode::AuthFailed, "bad credentials");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "AUTH_FAILED");
        assert_eq!(json["error"], "bad credentials");
    }

    #[test]
    fn test_register_request_parses_scenario_payload() {
        let raw = br#"{"username":"alice","password":"Alice1234","fullName":"Alice"}"#;
        let req: RegisterRequest = from_bytes(raw).unwrap();
        assert_eq!(req.username, "alice");
        assert_eq!(req.full_name, "Alice");
        assert!(req.bio.is_none());
    }

    #[test]
    fn test_send_message_request_parses_scenario_payload() {
        let chat_id = Uuid::new_v4();
        let sender_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"chatId":"{}","senderId":"{}","content":"hi","messageType":"TEXT"}}"#,
            chat_id, sender_id
        );
        let req: SendMessageRequest = from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(req.chat_id, chat_id);
        assert_eq!(req.message_type, MessageKind::Text);
    }

    #[test]
    fn test_malformed_payload_is_invalid() {
        let err = from_bytes::<LoginRequest>(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
        assert!(!err.is_fatal());
    }
}
