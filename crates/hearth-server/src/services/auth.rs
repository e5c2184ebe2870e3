//! Registration, login and credential management

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use hearth_protocol::model::{Session, UserProfile, UserStatus};
use hearth_protocol::payload::{LoginRequest, PasswordResetRequest, RegisterRequest};
use hearth_store::UserRepository;

use crate::error::{NotFoundKind, ServiceError, ServiceResult};
use crate::session::SessionManager;

/// Minimum accepted username length
const MIN_USERNAME_LEN: usize = 3;

/// Minimum accepted password length
const MIN_PASSWORD_LEN: usize = 8;

/// Account and credential operations
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<SessionManager>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, sessions: Arc<SessionManager>) -> Self {
        Self { users, sessions }
    }

    /// Create an account from a registration draft
    pub async fn register(&self, req: RegisterRequest) -> ServiceResult<UserProfile> {
        let username = req.username.trim();
        if username.len() < MIN_USERNAME_LEN {
            return Err(ServiceError::Invalid(format!(
                "username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::Invalid(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(ServiceError::Invalid("username already taken".into()));
        }

        let (password_hash, salt) = hash_password(&req.password)?;
        let now = Utc::now();
        let profile = UserProfile {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            salt,
            full_name: req.full_name,
            avatar_data: None,
            bio: req.bio,
            status: UserStatus::Offline,
            created_at: now,
            updated_at: now,
        };

        let stored = self.users.save(profile).await?;
        info!(username, user_id = %stored.user_id, "registered user");
        Ok(stored)
    }

    /// Verify credentials and mint a session
    pub async fn login(&self, req: LoginRequest) -> ServiceResult<(UserProfile, Session)> {
        let user = self
            .users
            .find_by_username(&req.username)
            .await?
            .ok_or_else(|| ServiceError::AuthFailed("unknown username or password".into()))?;

        if !verify_password(&req.password, &user.password_hash) {
            warn!(username = %req.username, "failed login attempt");
            return Err(ServiceError::AuthFailed("unknown username or password".into()));
        }

        let session = self.sessions.mint(user.user_id, req.device_info).await?;

        let mut online = user.clone();
        online.status = UserStatus::Online;
        online.updated_at = Utc::now();
        let stored = self.users.save(online).await?;

        info!(username = %req.username, session_id = %session.session_id, "login");
        Ok((stored, session))
    }

    /// Terminate the presented session
    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.sessions.terminate(token).await
    }

    /// Verify the old password, re-hash the new one under a fresh salt and
    /// kick every other session of the user
    pub async fn reset_password(
        &self,
        user_id: Uuid,
        req: PasswordResetRequest,
    ) -> ServiceResult<UserProfile> {
        if req.new_password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::Invalid(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound(NotFoundKind::User))?;

        if !verify_password(&req.old_password, &user.password_hash) {
            return Err(ServiceError::AuthFailed("old password does not match".into()));
        }

        let (password_hash, salt) = hash_password(&req.new_password)?;
        let mut updated = user;
        updated.password_hash = password_hash;
        updated.salt = salt;
        updated.updated_at = Utc::now();
        let stored = self.users.save(updated).await?;

        let kicked = self.sessions.terminate_all(user_id).await?;
        info!(user_id = %user_id, kicked, "password reset");
        Ok(stored)
    }
}

/// Argon2id-hash a password; returns `(phc_string, salt)`
fn hash_password(password: &str) -> ServiceResult<(String, String)> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::Internal(format!("password hash: {}", e)))?;
    Ok((hash.to_string(), salt.to_string()))
}

/// Constant-time verification against a stored PHC string
fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_store::{MemorySessionRepository, MemoryUserRepository};

    fn service() -> AuthService {
        let sessions = Arc::new(SessionManager::new(
            Some("test".into()),
            3600,
            Arc::new(MemorySessionRepository::new()),
        ));
        AuthService::new(Arc::new(MemoryUserRepository::new()), sessions)
    }

    fn register_req(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: "Alice1234".into(),
            full_name: "Alice".into(),
            bio: None,
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let service = service();
        let profile = service.register(register_req("alice")).await.unwrap();
        assert_ne!(profile.password_hash, "Alice1234");
        assert!(profile.password_hash.starts_with("$argon2"));
        assert!(!profile.salt.is_empty());
        assert_eq!(profile.status, UserStatus::Offline);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = service();

        let mut req = register_req("al");
        assert!(matches!(
            service.register(req).await,
            Err(ServiceError::Invalid(_))
        ));

        req = register_req("alice");
        req.password = "short".into();
        assert!(matches!(
            service.register(req).await,
            Err(ServiceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let service = service();
        service.register(register_req("alice")).await.unwrap();
        assert!(matches!(
            service.register(register_req("alice")).await,
            Err(ServiceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_login_roundtrip() {
        let service = service();
        let registered = service.register(register_req("alice")).await.unwrap();

        let (user, session) = service
            .login(LoginRequest {
                username: "alice".into(),
                password: "Alice1234".into(),
                device_info: None,
            })
            .await
            .unwrap();

        assert_eq!(user.user_id, registered.user_id);
        assert_eq!(user.status, UserStatus::Online);
        assert!(!session.token.is_empty());
        assert!(session.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let service = service();
        service.register(register_req("alice")).await.unwrap();

        let result = service
            .login(LoginRequest {
                username: "alice".into(),
                password: "WrongPass1".into(),
                device_info: None,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let service = service();
        let result = service
            .login(LoginRequest {
                username: "nobody".into(),
                password: "whatever123".into(),
                device_info: None,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_password_reset_invalidates_sessions() {
        let service = service();
        let user = service.register(register_req("alice")).await.unwrap();
        let (_, session) = service
            .login(LoginRequest {
                username: "alice".into(),
                password: "Alice1234".into(),
                device_info: None,
            })
            .await
            .unwrap();

        service
            .reset_password(
                user.user_id,
                PasswordResetRequest {
                    old_password: "Alice1234".into(),
                    new_password: "NewPass5678".into(),
                },
            )
            .await
            .unwrap();

        // Old session is dead, old password refused, new password works
        assert!(service.sessions.validate(&session.token).await.is_err());
        assert!(service
            .login(LoginRequest {
                username: "alice".into(),
                password: "Alice1234".into(),
                device_info: None,
            })
            .await
            .is_err());
        service
            .login(LoginRequest {
                username: "alice".into(),
                password: "NewPass5678".into(),
                device_info: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_rejects_wrong_old_password() {
        let service = service();
        let user = service.register(register_req("alice")).await.unwrap();
        let result = service
            .reset_password(
                user.user_id,
                PasswordResetRequest {
                    old_password: "Nope12345".into(),
                    new_password: "NewPass5678".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::AuthFailed(_))));
    }
}
