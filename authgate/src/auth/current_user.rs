use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    api::models::users::UserResponse,
    errors::{Error, Result},
    types::UserId,
};

/// The authenticated identity of a request.
///
/// Attached to request extensions by the Bearer gate and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub role_level: i32,
}

impl From<&UserResponse> for Principal {
    fn from(user: &UserResponse) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role_level: user.role.level,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(Error::Unauthenticated { message: None })
    }
}
