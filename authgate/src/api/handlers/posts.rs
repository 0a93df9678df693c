//! Posts: user-owned resources guarded by the ownership gate.
//!
//! Any authenticated user may create and read posts. Updating requires `moderator`, which an
//! owner satisfies through the self-service role. Deleting requires `admin`, which ownership
//! never satisfies.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    api::extract::JsonBody,
    api::models::posts::{PostCreate, PostResponse, PostUpdate},
    auth::{current_user::Principal, permissions::authorize_owner_action},
    db::models::posts::{PostCreateDBRequest, PostDBResponse, PostUpdateDBRequest},
    errors::Error,
    types::PostId,
};

/// Role an update requires
pub const UPDATE_ROLE: &str = "moderator";
/// Role a delete requires
pub const DELETE_ROLE: &str = "admin";

const MAX_TITLE_CHARS: usize = 200;

fn validate_title(title: &str) -> Result<(), Error> {
    if title.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Title is required".to_string(),
        });
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::BadRequest {
            message: format!("Title must be no more than {MAX_TITLE_CHARS} characters"),
        });
    }
    Ok(())
}

async fn load_post(state: &AppState, id: PostId) -> Result<PostDBResponse, Error> {
    state.posts.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Post".to_string(),
        id: id.to_string(),
    })
}

/// Create a post owned by the caller
#[utoipa::path(
    post,
    path = "/posts",
    request_body = PostCreate,
    tag = "posts",
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %principal.id))]
pub async fn create_post(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(request): JsonBody<PostCreate>,
) -> Result<(StatusCode, Json<PostResponse>), Error> {
    validate_title(&request.title)?;

    let post = state
        .posts
        .create(&PostCreateDBRequest {
            id: Uuid::new_v4(),
            user_id: principal.id,
            title: request.title.trim().to_string(),
            content: request.content,
            tags: request.tags,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

/// Get a post by id
#[utoipa::path(
    get,
    path = "/posts/{id}",
    tag = "posts",
    params(
        ("id" = uuid::Uuid, Path, description = "Post ID"),
    ),
    responses(
        (status = 200, description = "Post found", body = PostResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Post not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(post_id = %id))]
pub async fn get_post(State(state): State<AppState>, _principal: Principal, Path(id): Path<PostId>) -> Result<Json<PostResponse>, Error> {
    Ok(Json(PostResponse::from(load_post(&state, id).await?)))
}

/// Update a post
#[utoipa::path(
    patch,
    path = "/posts/{id}",
    request_body = PostUpdate,
    tag = "posts",
    params(
        ("id" = uuid::Uuid, Path, description = "Post ID"),
    ),
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 403, description = "Neither the owner nor a moderator"),
        (status = 404, description = "Post not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(post_id = %id, user_id = %principal.id))]
pub async fn update_post(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<PostId>,
    JsonBody(request): JsonBody<PostUpdate>,
) -> Result<Json<PostResponse>, Error> {
    let post = load_post(&state, id).await?;
    authorize_owner_action(
        state.roles.as_ref(),
        &principal,
        post.user_id,
        UPDATE_ROLE,
        &state.config.authorization.self_service_role,
        "update post",
    )
    .await?;

    if let Some(title) = &request.title {
        validate_title(title)?;
    }

    let updated = state
        .posts
        .update(
            id,
            &PostUpdateDBRequest {
                title: request.title.map(|t| t.trim().to_string()),
                content: request.content,
            },
        )
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Post".to_string(),
            id: id.to_string(),
        })?;

    Ok(Json(PostResponse::from(updated)))
}

/// Delete a post
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    tag = "posts",
    params(
        ("id" = uuid::Uuid, Path, description = "Post ID"),
    ),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Post not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(post_id = %id, user_id = %principal.id))]
pub async fn delete_post(State(state): State<AppState>, principal: Principal, Path(id): Path<PostId>) -> Result<StatusCode, Error> {
    let post = load_post(&state, id).await?;
    authorize_owner_action(
        state.roles.as_ref(),
        &principal,
        post.user_id,
        DELETE_ROLE,
        &state.config.authorization.self_service_role,
        "delete post",
    )
    .await?;

    if !state.posts.delete(id).await? {
        return Err(Error::NotFound {
            resource: "Post".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
