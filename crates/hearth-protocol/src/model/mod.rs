//! Domain entities carried as JSON payloads
//!
//! Conventions shared by every entity: identifiers are canonical UUID
//! strings, timestamps are ISO-8601 (`chrono` serde), binary blobs such
//! as avatars are Base64 strings, and field names are camelCase on the
//! wire.

mod chat;
mod message;
mod session;
mod user;

pub use chat::{Chat, ChatParticipant, ChatRole, ChatType};
pub use message::{Message, MessageKind, DELETED_CONTENT};
pub use session::Session;
pub use user::{UserProfile, UserStatus};
