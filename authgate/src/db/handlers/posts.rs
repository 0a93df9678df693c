//! Database repository for posts.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::posts::{PostCreateDBRequest, PostDBResponse, PostUpdateDBRequest},
    },
    types::{PostId, abbrev_uuid},
};

pub struct Posts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Posts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &PostCreateDBRequest) -> Result<PostDBResponse> {
        let post = sqlx::query_as::<_, PostDBResponse>(
            r#"
            INSERT INTO posts (id, user_id, title, content, tags)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, content, tags, created_at, updated_at
            "#,
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.title)
        .bind(&request.content)
        .bind(&request.tags)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(post)
    }

    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: PostId) -> Result<Option<PostDBResponse>> {
        let post = sqlx::query_as::<_, PostDBResponse>(
            "SELECT id, user_id, title, content, tags, created_at, updated_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(post)
    }

    #[instrument(skip(self, request), fields(post_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: PostId, request: &PostUpdateDBRequest) -> Result<Option<PostDBResponse>> {
        let post = sqlx::query_as::<_, PostDBResponse>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, title, content, tags, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.content)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(post)
    }

    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: PostId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
