use axum::{
    Json,
    extract::{Path, State},
};

use crate::{AppState, api::models::users::UserResponse, auth::current_user::Principal, errors::Error, types::UserId};

/// Get a user by id
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = uuid::Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn get_user(State(state): State<AppState>, _principal: Principal, Path(id): Path<UserId>) -> Result<Json<UserResponse>, Error> {
    let user = state.users.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(UserResponse::from(user)))
}
