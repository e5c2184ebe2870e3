//! Profile operations

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use hearth_protocol::model::{UserProfile, UserStatus};
use hearth_protocol::payload::{AvatarBody, SearchRequest, UpdateProfileRequest};
use hearth_store::UserRepository;

use crate::error::{NotFoundKind, ServiceError, ServiceResult};

/// Search results are capped regardless of the requested limit
const MAX_SEARCH_RESULTS: u32 = 100;

/// Profile reads and self-service updates
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    async fn load(&self, user_id: Uuid) -> ServiceResult<UserProfile> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound(NotFoundKind::User))
    }

    /// Public view of any profile
    pub async fn get_profile(&self, user_id: Uuid) -> ServiceResult<UserProfile> {
        Ok(self.load(user_id).await?.redacted())
    }

    /// Update one's own profile fields
    pub async fn update_profile(
        &self,
        requester: Uuid,
        req: UpdateProfileRequest,
    ) -> ServiceResult<UserProfile> {
        if req.user_id != requester {
            return Err(ServiceError::Forbidden(
                "can only update your own profile".into(),
            ));
        }

        let mut user = self.load(req.user_id).await?;
        if let Some(full_name) = req.full_name {
            user.full_name = full_name;
        }
        if let Some(bio) = req.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar) = req.avatar {
            user.avatar_data = Some(avatar);
        }
        user.updated_at = Utc::now();

        Ok(self.users.save(user).await?.redacted())
    }

    /// Username substring search
    pub async fn search(&self, req: SearchRequest) -> ServiceResult<Vec<UserProfile>> {
        if req.query.trim().is_empty() {
            return Err(ServiceError::Invalid("empty search query".into()));
        }
        let limit = req.limit.min(MAX_SEARCH_RESULTS);
        let hits = self.users.search_by_username(req.query.trim(), limit).await?;
        Ok(hits.into_iter().map(|u| u.redacted()).collect())
    }

    /// Set one's own presence status
    pub async fn update_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> ServiceResult<UserProfile> {
        let mut user = self.load(user_id).await?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(self.users.save(user).await?.redacted())
    }

    /// Mark a user offline if they still exist (connection teardown path)
    pub async fn mark_offline(&self, user_id: Uuid) -> ServiceResult<()> {
        if let Some(mut user) = self.users.find_by_id(user_id).await? {
            user.status = UserStatus::Offline;
            user.updated_at = Utc::now();
            self.users.save(user).await?;
        }
        Ok(())
    }

    /// Profiles for the given online user ids, invisible users filtered out
    pub async fn online_list(&self, online_ids: &[Uuid]) -> ServiceResult<Vec<UserProfile>> {
        let mut result = Vec::with_capacity(online_ids.len());
        for id in online_ids {
            if let Some(user) = self.users.find_by_id(*id).await? {
                if user.status != UserStatus::Invisible {
                    result.push(user.redacted());
                }
            }
        }
        result.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(result)
    }

    /// Fetch a user's avatar
    pub async fn get_avatar(&self, user_id: Uuid) -> ServiceResult<AvatarBody> {
        let user = self.load(user_id).await?;
        Ok(AvatarBody {
            user_id,
            avatar_data: user.avatar_data,
        })
    }

    /// Replace one's own avatar
    pub async fn set_avatar(&self, user_id: Uuid, avatar_data: String) -> ServiceResult<UserProfile> {
        use base64::Engine as _;
        if base64::engine::general_purpose::STANDARD
            .decode(&avatar_data)
            .is_err()
        {
            return Err(ServiceError::Invalid("avatar must be base64".into()));
        }

        let mut user = self.load(user_id).await?;
        user.avatar_data = Some(avatar_data);
        user.updated_at = Utc::now();
        Ok(self.users.save(user).await?.redacted())
    }
}
