//! Store capabilities consumed by the auth layer, and their Postgres implementation.
//!
//! Handlers and workflows depend only on these traits, so an in-memory store can stand in for
//! Postgres in tests.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::{
    db::{
        errors::Result,
        handlers::{Invitations, Posts, Roles, Users},
        models::{
            invitations::{ActivationOutcome, InvitationCreateDBRequest},
            posts::{PostCreateDBRequest, PostDBResponse, PostUpdateDBRequest},
            roles::RoleDBResponse,
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    types::{PostId, UserId, abbrev_uuid},
};

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an inactive user and its invitation as one unit. Neither persists without the other.
    async fn create_and_invite(&self, user: &UserCreateDBRequest, invitation: &InvitationCreateDBRequest) -> Result<UserDBResponse>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<UserDBResponse>>;

    /// Atomically consume the invitation with this digest and activate its user.
    async fn activate(&self, token_digest: &str, now: DateTime<Utc>) -> Result<ActivationOutcome>;

    /// Delete a user together with any invitation it still holds.
    async fn delete(&self, id: UserId) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>>;
}

#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, request: &PostCreateDBRequest) -> Result<PostDBResponse>;

    async fn get_by_id(&self, id: PostId) -> Result<Option<PostDBResponse>>;

    async fn update(&self, id: PostId, request: &PostUpdateDBRequest) -> Result<Option<PostDBResponse>>;

    async fn delete(&self, id: PostId) -> Result<bool>;
}

/// Postgres-backed implementation of every store capability.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for PgStore {
    #[instrument(skip_all, fields(username = %user.username), err)]
    async fn create_and_invite(&self, user: &UserCreateDBRequest, invitation: &InvitationCreateDBRequest) -> Result<UserDBResponse> {
        let mut tx = self.pool.begin().await?;

        let created = Users::new(&mut tx).create(user).await?;
        Invitations::new(&mut tx).create(created.id, invitation).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_user_by_email(email).await
    }

    #[instrument(skip_all, err)]
    async fn activate(&self, token_digest: &str, now: DateTime<Utc>) -> Result<ActivationOutcome> {
        let mut tx = self.pool.begin().await?;

        // The row lock makes a concurrent activation with the same digest wait, then find nothing.
        let Some(invitation) = Invitations::new(&mut tx).get_by_digest_for_update(token_digest).await? else {
            return Ok(ActivationOutcome::Invalid);
        };

        if invitation.expires_at <= now {
            debug!(user_id = %abbrev_uuid(&invitation.user_id), "invitation expired");
            return Ok(ActivationOutcome::Expired);
        }

        if !Users::new(&mut tx).set_active(invitation.user_id).await? {
            return Ok(ActivationOutcome::Invalid);
        }
        if !Invitations::new(&mut tx).delete(token_digest).await? {
            return Ok(ActivationOutcome::Invalid);
        }

        tx.commit().await?;
        Ok(ActivationOutcome::Activated(invitation.user_id))
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).delete(id).await
    }
}

#[async_trait::async_trait]
impl RoleStore for PgStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Roles::new(&mut conn).get_by_name(name).await
    }
}

#[async_trait::async_trait]
impl PostStore for PgStore {
    async fn create(&self, request: &PostCreateDBRequest) -> Result<PostDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Posts::new(&mut conn).create(request).await
    }

    async fn get_by_id(&self, id: PostId) -> Result<Option<PostDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Posts::new(&mut conn).get_by_id(id).await
    }

    async fn update(&self, id: PostId, request: &PostUpdateDBRequest) -> Result<Option<PostDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Posts::new(&mut conn).update(id, request).await
    }

    async fn delete(&self, id: PostId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Posts::new(&mut conn).delete(id).await
    }
}
