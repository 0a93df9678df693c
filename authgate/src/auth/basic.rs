//! Basic gate for operational routes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{AppState, config::BasicAuthConfig, errors::Error};

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Compare fixed-length digests so the comparison time does not depend on the input length.
fn secret_eq(supplied: &str, expected: &str) -> bool {
    constant_time_eq(&Sha256::digest(supplied.as_bytes()), &Sha256::digest(expected.as_bytes()))
}

/// Decode `Authorization: Basic <base64(user:pass)>` into its two halves.
fn parse_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// True only if both username and password match the operator pair.
pub fn check_credentials(headers: &HeaderMap, expected: &BasicAuthConfig) -> bool {
    let Some((username, password)) = parse_basic_credentials(headers) else {
        return false;
    };

    // Evaluate both so a wrong username costs the same as a wrong password
    let username_ok = secret_eq(&username, &expected.username);
    let password_ok = secret_eq(&password, &expected.password);
    username_ok & password_ok
}

pub async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    if !check_credentials(request.headers(), &state.config.auth.basic) {
        debug!("Basic authentication rejected");
        return Err(Error::BasicAuthRequired);
    }
    Ok(next.run(request).await)
}
