//! Database repository for user invitations.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::invitations::{InvitationCreateDBRequest, InvitationDBResponse},
    },
    types::{UserId, abbrev_uuid},
};

pub struct Invitations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Invitations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create(&mut self, user_id: UserId, request: &InvitationCreateDBRequest) -> Result<InvitationDBResponse> {
        let invitation = sqlx::query_as::<_, InvitationDBResponse>(
            r#"
            INSERT INTO user_invitations (token_digest, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token_digest, user_id, expires_at, created_at
            "#,
        )
        .bind(&request.token_digest)
        .bind(user_id)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(invitation)
    }

    /// Fetch and row-lock an invitation. Must run inside a transaction.
    #[instrument(skip_all, err)]
    pub async fn get_by_digest_for_update(&mut self, token_digest: &str) -> Result<Option<InvitationDBResponse>> {
        let invitation = sqlx::query_as::<_, InvitationDBResponse>(
            r#"
            SELECT token_digest, user_id, expires_at, created_at
            FROM user_invitations
            WHERE token_digest = $1
            FOR UPDATE
            "#,
        )
        .bind(token_digest)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(invitation)
    }

    #[instrument(skip_all, err)]
    pub async fn delete(&mut self, token_digest: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_invitations WHERE token_digest = $1")
            .bind(token_digest)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
