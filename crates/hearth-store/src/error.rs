//! Store error types

use std::fmt;

/// Storage layer errors
#[derive(Debug)]
pub enum StoreError {
    /// No row for the given key
    NotFound(String),
    /// Uniqueness constraint violated
    Conflict(String),
    /// Backend failure (connection, corruption, ...)
    Backend(String),
    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {}", what),
            Self::Conflict(what) => write!(f, "conflict: {}", what),
            Self::Backend(msg) => write!(f, "backend error: {}", msg),
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
