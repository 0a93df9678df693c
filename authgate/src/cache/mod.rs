//! Principal cache: a revocable copy of user records keyed by id, always filled from the primary
//! store and never written to independently.

mod in_process;
#[cfg(feature = "redis")]
mod shared;

use std::sync::Arc;
use thiserror::Error;

use crate::{
    api::models::users::UserResponse,
    config::{CacheBackend, CacheConfig},
    types::UserId,
};

pub use in_process::MokaPrincipalCache;
#[cfg(feature = "redis")]
pub use shared::RedisPrincipalCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cached value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait PrincipalCache: Send + Sync {
    /// `Ok(None)` is a miss.
    async fn get(&self, id: UserId) -> Result<Option<UserResponse>, CacheError>;

    async fn set(&self, user: &UserResponse) -> Result<(), CacheError>;
}

/// Build the configured cache, or `None` if caching is disabled.
pub fn from_config(config: &CacheConfig) -> Result<Option<Arc<dyn PrincipalCache>>, CacheError> {
    if !config.enabled {
        return Ok(None);
    }

    match config.backend {
        CacheBackend::Moka => Ok(Some(Arc::new(MokaPrincipalCache::new(config)))),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::Backend("cache.redis_url is not set".to_string()))?;
            Ok(Some(Arc::new(RedisPrincipalCache::new(url, config.ttl)?)))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => Err(CacheError::Backend(
            "redis backend requested but the redis feature is not enabled".to_string(),
        )),
    }
}
