use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{PostId, UserId};

#[derive(Debug, Clone)]
pub struct PostCreateDBRequest {
    pub id: PostId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Fields left as `None` keep their stored value
#[derive(Debug, Clone, Default)]
pub struct PostUpdateDBRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PostDBResponse {
    pub id: PostId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
