use moka::future::Cache;

use super::{CacheError, PrincipalCache};
use crate::{api::models::users::UserResponse, config::CacheConfig, types::UserId};

/// In-process cache. Entries expire after the configured TTL.
pub struct MokaPrincipalCache {
    cache: Cache<UserId, UserResponse>,
}

impl MokaPrincipalCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
        }
    }
}

#[async_trait::async_trait]
impl PrincipalCache for MokaPrincipalCache {
    async fn get(&self, id: UserId) -> Result<Option<UserResponse>, CacheError> {
        Ok(self.cache.get(&id).await)
    }

    async fn set(&self, user: &UserResponse) -> Result<(), CacheError> {
        self.cache.insert(user.id, user.clone()).await;
        Ok(())
    }
}
