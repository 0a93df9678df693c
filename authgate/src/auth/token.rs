//! Bearer token issuance and validation.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::{config::TokenConfig, errors::Error, types::UserId};

/// Signed payload of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: UserId,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl AuthClaims {
    /// Claims for `subject`, valid from `now` until `now + expiry`.
    pub fn new(subject: UserId, config: &TokenConfig, now: DateTime<Utc>) -> Self {
        let exp = now + config.expiry;

        Self {
            sub: subject,
            iss: config.issuer.clone(),
            aud: config.audience().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    SigningError(String),
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token is malformed")]
    MalformedToken,
    #[error("token claims are invalid")]
    InvalidClaims,
}

/// Callers only ever learn that authentication failed, never which check tripped.
impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SigningError(reason) => Error::Internal {
                operation: format!("sign token: {reason}"),
            },
            _ => Error::Unauthenticated { message: None },
        }
    }
}

/// Issues and verifies bearer tokens.
pub trait TokenAuthenticator: Send + Sync {
    fn generate_token(&self, claims: &AuthClaims) -> Result<String, TokenError>;
    fn validate_token(&self, token: &str) -> Result<AuthClaims, TokenError>;
}

/// HS256 JWTs signed with a shared secret.
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: &TokenConfig) -> Result<Self, Error> {
        let secret = config.secret.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| Error::Internal {
            operation: "build token authenticator: auth.token.secret is required".to_string(),
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[config.audience()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }
}

impl TokenAuthenticator for JwtAuthenticator {
    fn generate_token(&self, claims: &AuthClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| TokenError::SigningError(e.to_string()))
    }

    fn validate_token(&self, token: &str) -> Result<AuthClaims, TokenError> {
        // The signature is checked before any claim is looked at.
        let data = decode::<AuthClaims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::InvalidAlgorithm => TokenError::InvalidClaims,
            _ => TokenError::MalformedToken,
        })?;

        let claims = data.claims;
        if claims.iat > claims.nbf {
            return Err(TokenError::InvalidClaims);
        }

        Ok(claims)
    }
}

/// Accepts any well-formed token without checking its signature or timing.
///
/// Only compiled into test builds.
#[cfg(any(test, feature = "test-utils"))]
pub struct TestAuthenticator {
    validation: Validation,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for TestAuthenticator {
    fn default() -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self { validation }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TokenAuthenticator for TestAuthenticator {
    fn generate_token(&self, claims: &AuthClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(b"test"))
            .map_err(|e| TokenError::SigningError(e.to_string()))
    }

    fn validate_token(&self, token: &str) -> Result<AuthClaims, TokenError> {
        decode::<AuthClaims>(token, &DecodingKey::from_secret(&[]), &self.validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::MalformedToken)
    }
}
