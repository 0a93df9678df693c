use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::RoleId;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleDBResponse {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub level: i32,
}
