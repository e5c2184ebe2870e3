//! Repository contracts and in-memory stores for Hearth
//!
//! The server core consumes the repository traits only; the in-memory
//! implementations back tests and single-node deployments without an
//! external database.

#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod repository;

pub use error::StoreError;
pub use memory::{MemoryChatRepository, MemoryMessageRepository, MemorySessionRepository, MemoryUserRepository};
pub use repository::{ChatRepository, MessageRepository, SessionRepository, UserRepository};

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
