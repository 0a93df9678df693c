//! Bearer gate for user-facing routes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, trace, warn};

use crate::{
    AppState,
    api::models::users::UserResponse,
    auth::current_user::Principal,
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve a user id to a principal: cache first, then the primary store.
///
/// A store miss means the token outlived its user and is treated as unauthenticated. Cache
/// failures are logged and otherwise ignored.
#[instrument(skip(state), fields(user_id = %abbrev_uuid(&id)), err)]
pub async fn resolve_principal(state: &AppState, id: UserId) -> Result<Principal> {
    if let Some(cache) = &state.cache {
        match cache.get(id).await {
            Ok(Some(user)) => {
                trace!("Principal cache hit");
                return Ok(Principal::from(&user));
            }
            Ok(None) => trace!("Principal cache miss"),
            Err(e) => warn!(error = %e, "Principal cache read failed, falling back to store"),
        }
    }

    let user = state.users.get_by_id(id).await?.ok_or_else(|| {
        debug!("Token subject no longer exists");
        Error::Unauthenticated { message: None }
    })?;
    let user = UserResponse::from(user);

    if let Some(cache) = &state.cache
        && let Err(e) = cache.set(&user).await
    {
        warn!(error = %e, "Principal cache write failed");
    }

    Ok(Principal::from(&user))
}

pub async fn bearer_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response> {
    let token = bearer_token(request.headers()).ok_or(Error::Unauthenticated { message: None })?;
    let claims = state.authenticator.validate_token(token)?;

    let principal = resolve_principal(&state, claims.sub).await?;
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
