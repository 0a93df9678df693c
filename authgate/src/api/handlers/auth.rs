use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    AppState,
    api::extract::JsonBody,
    api::models::{
        auth::{LoginRequest, RegisterRequest, RegisterResponse, TokenResponse},
        users::UserResponse,
    },
    auth::{password, token::AuthClaims},
    errors::Error,
    types::abbrev_uuid,
    workflow::registration::RegistrationWorkflow,
};

/// The one message every login failure carries.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    }
}

/// Register a new user account
///
/// The account starts inactive. The response carries the invitation token that activates it;
/// the same token is emailed as an activation link.
#[utoipa::path(
    post,
    path = "/authentication/user",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered, awaiting activation", body = RegisterResponse),
        (status = 400, description = "Invalid input, or email/username already registered"),
        (status = 500, description = "Registration failed and was rolled back"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), Error> {
    let registration = RegistrationWorkflow::new(&state).register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(registration.user),
            token: registration.token,
        }),
    ))
}

/// Activate an account with the token from its activation link
#[utoipa::path(
    put,
    path = "/users/activate/{token}",
    tag = "authentication",
    params(
        ("token" = String, Path, description = "Plaintext invitation token"),
    ),
    responses(
        (status = 204, description = "Account activated"),
        (status = 400, description = "Invitation has expired"),
        (status = 404, description = "No pending invitation matches this token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn activate(State(state): State<AppState>, Path(token): Path<String>) -> Result<StatusCode, Error> {
    RegistrationWorkflow::new(&state).activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Exchange email and password for a bearer token
#[utoipa::path(
    post,
    path = "/authentication/token",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, JsonBody(request): JsonBody<LoginRequest>) -> Result<(StatusCode, Json<TokenResponse>), Error> {
    let Some(user) = state.users.get_by_email(request.email.trim()).await? else {
        debug!("Login for unknown email");
        // Pay the same hashing cost as a real account so timing does not reveal which emails exist
        let policy = state.config.auth.password.clone();
        tokio::task::spawn_blocking(move || password::verify_dummy(&request.password, &policy))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })??;
        return Err(invalid_credentials());
    };

    // Verify password on a blocking thread to avoid blocking async runtime
    let hash = user.password_hash.clone();
    let supplied = request.password;
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&supplied, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;
    if !is_valid {
        debug!(user_id = %abbrev_uuid(&user.id), "Login with wrong password");
        return Err(invalid_credentials());
    }

    if state.config.auth.require_activation_for_login && !user.is_active {
        debug!(user_id = %abbrev_uuid(&user.id), "Login before activation");
        return Err(invalid_credentials());
    }

    let claims = AuthClaims::new(user.id, &state.config.auth.token, Utc::now());
    let token = state.authenticator.generate_token(&claims)?;
    info!(user_id = %abbrev_uuid(&user.id), "Issued bearer token");

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
