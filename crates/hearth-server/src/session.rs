//! Session minting and validation
//!
//! Sessions are JWTs (HMAC-SHA256) backed by the session repository and
//! fronted by an in-memory token cache. The cache is kept consistent with
//! the repository for every non-expired entry; validation never succeeds
//! for an expired token.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use hearth_protocol::model::Session;
use hearth_store::SessionRepository;

use crate::error::{ServiceError, ServiceResult};

/// Issuer claim stamped into every token
pub const TOKEN_ISSUER: &str = "chatv2-server";

/// JWT claim set
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    /// User id as canonical UUID string
    sub: String,
    iat: i64,
    exp: i64,
    /// Random token id, makes every mint unique
    jti: String,
}

/// Mints, validates and retires session tokens
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    repo: Arc<dyn SessionRepository>,
    /// token -> session, for non-expired sessions only
    cache: DashMap<String, Session>,
}

impl SessionManager {
    /// Create a manager with the given HMAC secret; a random secret is
    /// generated when none is configured (tokens then die with the process)
    pub fn new(
        secret: Option<String>,
        token_ttl_secs: u64,
        repo: Arc<dyn SessionRepository>,
    ) -> Self {
        let secret = secret.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            bytes.iter().map(|b| format!("{:02x}", b)).collect()
        });
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: Duration::seconds(token_ttl_secs as i64),
            repo,
            cache: DashMap::new(),
        }
    }

    fn sign(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> ServiceResult<(String, DateTime<Utc>)> {
        let expires_at = issued_at + self.token_ttl;
        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("jwt encode: {}", e)))?;
        Ok((token, expires_at))
    }

    /// Mint a fresh session for a just-authenticated user
    pub async fn mint(&self, user_id: Uuid, device_info: Option<String>) -> ServiceResult<Session> {
        let now = Utc::now();
        let (token, expires_at) = self.sign(user_id, now)?;

        let session = Session {
            session_id: Uuid::new_v4(),
            user_id,
            token: token.clone(),
            expires_at,
            created_at: now,
            last_accessed_at: now,
            device_info,
        };

        let stored = self.repo.save(session).await?;
        self.cache.insert(token, stored.clone());
        Ok(stored)
    }

    /// Verify a token and return its live session
    ///
    /// Checks signature, issuer and expiry, then resolves the session from
    /// cache (falling back to the repository) and touches
    /// `last_accessed_at`.
    pub async fn validate(&self, token: &str) -> ServiceResult<Session> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::SessionExpired,
                _ => ServiceError::AuthFailed(format!("invalid token: {}", e)),
            }
        })?;

        let session = match self.cache.get(token) {
            Some(cached) => cached.clone(),
            None => self
                .repo
                .find_by_token(token)
                .await?
                .ok_or_else(|| ServiceError::AuthFailed("unknown token".into()))?,
        };

        // The store can hold a session that was force-terminated after the
        // token was signed; the signature alone is not enough.
        if !session.is_valid() {
            self.cache.remove(token);
            return Err(ServiceError::SessionExpired);
        }

        let mut touched = session;
        touched.last_accessed_at = Utc::now();
        let stored = self.repo.save(touched).await?;
        self.cache.insert(token.to_string(), stored.clone());
        Ok(stored)
    }

    /// Replace a valid session's token, keeping its `session_id`
    pub async fn refresh(&self, token: &str) -> ServiceResult<Session> {
        let session = self.validate(token).await?;

        let now = Utc::now();
        let (new_token, expires_at) = self.sign(session.user_id, now)?;

        let refreshed = Session {
            token: new_token.clone(),
            expires_at,
            last_accessed_at: now,
            ..session
        };
        let stored = self.repo.save(refreshed).await?;

        self.cache.remove(token);
        self.cache.insert(new_token, stored.clone());
        Ok(stored)
    }

    /// Terminate the session behind a token
    ///
    /// The session is marked expired (not deleted) so audit trails survive
    /// until cleanup collects it.
    pub async fn terminate(&self, token: &str) -> ServiceResult<()> {
        let session = match self.repo.find_by_token(token).await? {
            Some(s) => s,
            None => return Ok(()),
        };
        self.expire_session(session).await
    }

    /// Terminate every session of a user (password change, admin kick)
    pub async fn terminate_all(&self, user_id: Uuid) -> ServiceResult<usize> {
        let sessions = self.repo.find_by_user_id(user_id).await?;
        let mut count = 0;
        for session in sessions {
            if session.is_valid() {
                count += 1;
            }
            self.expire_session(session).await?;
        }
        Ok(count)
    }

    async fn expire_session(&self, mut session: Session) -> ServiceResult<()> {
        self.cache.remove(&session.token);
        session.expires_at = Utc::now() - Duration::seconds(1);
        self.repo.save(session).await?;
        Ok(())
    }

    /// Delete sessions expired for longer than `grace_secs`
    pub async fn cleanup_expired(&self, grace_secs: u64) -> ServiceResult<usize> {
        let cutoff = Utc::now() - Duration::seconds(grace_secs as i64);
        let expired = self.repo.find_expired(cutoff).await?;
        let count = expired.len();
        for session in expired {
            self.cache.remove(&session.token);
            self.repo.delete(session.session_id).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_store::MemorySessionRepository;

    fn manager(ttl_secs: u64) -> SessionManager {
        SessionManager::new(
            Some("test-secret".into()),
            ttl_secs,
            Arc::new(MemorySessionRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_mint_and_validate() {
        let manager = manager(3600);
        let user_id = Uuid::new_v4();

        let session = manager.mint(user_id, Some("cli".into())).await.unwrap();
        assert!(!session.token.is_empty());
        assert!(session.expires_at > Utc::now());

        let validated = manager.validate(&session.token).await.unwrap();
        assert_eq!(validated.session_id, session.session_id);
        assert_eq!(validated.user_id, user_id);
        assert!(validated.last_accessed_at >= session.last_accessed_at);
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let manager = manager(3600);
        assert!(matches!(
            manager.validate("not.a.jwt").await,
            Err(ServiceError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_signature_rejected() {
        let ours = manager(3600);
        let theirs = SessionManager::new(
            Some("other-secret".into()),
            3600,
            Arc::new(MemorySessionRepository::new()),
        );
        let session = theirs.mint(Uuid::new_v4(), None).await.unwrap();
        assert!(matches!(
            ours.validate(&session.token).await,
            Err(ServiceError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let manager = manager(1);
        let session = manager.mint(Uuid::new_v4(), None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
        assert!(matches!(
            manager.validate(&session.token).await,
            Err(ServiceError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_cache_falls_back_to_repository() {
        let repo = Arc::new(MemorySessionRepository::new());
        let a = SessionManager::new(Some("shared".into()), 3600, repo.clone());
        let b = SessionManager::new(Some("shared".into()), 3600, repo);

        // Minted by a, validated by b whose cache is cold
        let session = a.mint(Uuid::new_v4(), None).await.unwrap();
        let validated = b.validate(&session.token).await.unwrap();
        assert_eq!(validated.session_id, session.session_id);
    }

    #[tokio::test]
    async fn test_refresh_keeps_session_id() {
        let manager = manager(3600);
        let session = manager.mint(Uuid::new_v4(), None).await.unwrap();

        let refreshed = manager.refresh(&session.token).await.unwrap();
        assert_eq!(refreshed.session_id, session.session_id);
        assert_ne!(refreshed.token, session.token);

        // New token validates; old one no longer resolves to a session
        manager.validate(&refreshed.token).await.unwrap();
        assert!(manager.validate(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_terminate() {
        let manager = manager(3600);
        let session = manager.mint(Uuid::new_v4(), None).await.unwrap();

        manager.terminate(&session.token).await.unwrap();
        assert!(matches!(
            manager.validate(&session.token).await,
            Err(ServiceError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_terminate_all_for_user() {
        let manager = manager(3600);
        let user_id = Uuid::new_v4();
        let s1 = manager.mint(user_id, None).await.unwrap();
        let s2 = manager.mint(user_id, None).await.unwrap();
        let other = manager.mint(Uuid::new_v4(), None).await.unwrap();

        let count = manager.terminate_all(user_id).await.unwrap();
        assert_eq!(count, 2);
        assert!(manager.validate(&s1.token).await.is_err());
        assert!(manager.validate(&s2.token).await.is_err());
        manager.validate(&other.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_deletes_old_sessions() {
        let manager = manager(3600);
        let session = manager.mint(Uuid::new_v4(), None).await.unwrap();
        manager.terminate(&session.token).await.unwrap();

        // Terminated a moment ago: survives a generous grace window
        assert_eq!(manager.cleanup_expired(60).await.unwrap(), 0);
        // Zero grace collects it
        assert_eq!(manager.cleanup_expired(0).await.unwrap(), 1);
    }
}
