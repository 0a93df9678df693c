use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{RoleId, UserId};

/// Database request for creating a new, inactive user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// Name of the role to assign; resolved to an id on insert
    pub role_name: String,
}

/// A user row joined with its role
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub role_id: RoleId,
    pub role_name: String,
    pub role_level: i32,
}
