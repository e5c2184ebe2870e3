//! User profile entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Presence state advertised by a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Online,
    Offline,
    Away,
    Busy,
    Invisible,
}

/// A registered user
///
/// `password_hash` and `salt` never leave the server: responses carry the
/// result of [`UserProfile::redacted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub salt: String,
    pub full_name: String,
    /// Base64-encoded image bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Copy with credential material blanked, safe to send to any peer
    pub fn redacted(&self) -> UserProfile {
        UserProfile {
            password_hash: String::new(),
            salt: String::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "$argon2id$...".into(),
            salt: "somesalt".into(),
            full_name: "Alice".into(),
            avatar_data: None,
            bio: Some("hi".into()),
            status: UserStatus::Online,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_redacted_clears_credentials() {
        let public = sample().redacted();
        assert!(public.password_hash.is_empty());
        assert!(public.salt.is_empty());
        assert_eq!(public.username, "alice");
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample().redacted()).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("fullName").is_some());
        assert_eq!(json["status"], "ONLINE");
        // absent optional field is omitted, not null
        assert!(json.get("avatarData").is_none());
    }
}
