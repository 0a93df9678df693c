//! Database repository for users.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    types::{UserId, abbrev_uuid},
};

const SELECT_USER: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.is_active, u.created_at,
           r.id AS role_id, r.name AS role_name, r.level AS role_level
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, is_active, role_id)
            VALUES ($1, $2, $3, $4, FALSE, (SELECT id FROM roles WHERE name = $5))
            "#,
        )
        .bind(request.id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(&request.role_name)
        .execute(&mut *self.db)
        .await?;

        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(request.id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{SELECT_USER} WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Flip an inactive user to active. Returns false if no inactive user had that id.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_active(&mut self, id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1 AND is_active = FALSE")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
