//! Service-level failures and their wire codes

use hearth_protocol::payload::{ErrorBody, ErrorCode};
use hearth_store::StoreError;
use thiserror::Error;

/// What a handler failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    User,
    Chat,
    Message,
}

/// A failed domain operation
///
/// Every variant maps onto exactly one wire [`ErrorCode`]; none of them
/// closes the connection.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("session expired")]
    SessionExpired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("{0:?} not found")]
    NotFound(NotFoundKind),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// The machine-readable code carried in the error response
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::AuthFailed(_) => ErrorCode::AuthFailed,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Invalid(_) => ErrorCode::InvalidRequest,
            Self::NotFound(NotFoundKind::User) => ErrorCode::UserNotFound,
            Self::NotFound(NotFoundKind::Chat) => ErrorCode::ChatNotFound,
            Self::NotFound(NotFoundKind::Message) => ErrorCode::MessageNotFound,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Response body for this failure (message text only, never internals)
    pub fn body(&self) -> ErrorBody {
        let text = match self {
            // Repository/internal detail stays in the server log
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        ErrorBody::new(self.code(), text)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Invalid(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result alias for handler and service methods
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(ServiceError::Unauthenticated.code(), ErrorCode::Unauthenticated);
        assert_eq!(
            ServiceError::AuthFailed("x".into()).code(),
            ErrorCode::AuthFailed
        );
        assert_eq!(ServiceError::SessionExpired.code(), ErrorCode::SessionExpired);
        assert_eq!(
            ServiceError::NotFound(NotFoundKind::Chat).code(),
            ErrorCode::ChatNotFound
        );
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = ServiceError::Internal("connection pool exhausted at db.rs:42".into());
        assert_eq!(err.body().error, "internal error");
    }

    #[test]
    fn test_store_conflict_becomes_invalid() {
        let err: ServiceError = StoreError::Conflict("username taken".into()).into();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
