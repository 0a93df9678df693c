use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use super::{CacheError, PrincipalCache};
use crate::{api::models::users::UserResponse, types::UserId};

/// Shared cache across instances. Values are JSON under `user-{id}` with a TTL.
///
/// One managed connection is opened on first use and shared by every request; it reconnects on
/// its own after a dropped socket.
pub struct RedisPrincipalCache {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    ttl: Duration,
}

impl RedisPrincipalCache {
    pub fn new(redis_url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            ttl,
        })
    }

    fn key(id: UserId) -> String {
        format!("user-{id}")
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| CacheError::Backend(e.to_string()))?;
                info!("Connected to redis principal cache");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait::async_trait]
impl PrincipalCache for RedisPrincipalCache {
    #[instrument(skip(self), err)]
    async fn get(&self, id: UserId) -> Result<Option<UserResponse>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(Self::key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn set(&self, user: &UserResponse) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(Self::key(user.id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }
}
