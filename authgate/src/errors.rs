use crate::db::errors::{DbError, DuplicateField};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

/// Challenge sent with every Basic gate rejection.
pub const BASIC_AUTH_CHALLENGE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or credentials rejected.
    /// The message is deliberately uniform across failure causes.
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Operator credentials missing or wrong on a Basic-gated route
    #[error("Basic authentication required")]
    BasicAuthRequired,

    /// Authenticated, but the role level or ownership does not permit the action
    #[error("Insufficient permissions to {action}")]
    Forbidden { action: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Email or username already registered
    #[error("{} already exists", field.as_str())]
    AlreadyExists { field: DuplicateField },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Invitation exists but is past its expiry
    #[error("Invitation token has expired")]
    TokenExpired,

    /// No pending invitation matches the supplied token
    #[error("Invitation token is invalid")]
    TokenInvalid,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } | Error::BasicAuthRequired => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::AlreadyExists { .. } | Error::TokenExpired => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::TokenInvalid => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BasicAuthRequired => "Authentication required".to_string(),
            Error::Forbidden { action } => format!("Insufficient permissions to {action}"),
            Error::BadRequest { message } => message.clone(),
            Error::AlreadyExists { field } => match field {
                DuplicateField::Email => "An account with this email address already exists".to_string(),
                DuplicateField::Username => "This username is already taken".to_string(),
            },
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::TokenExpired => "Invitation token has expired".to_string(),
            Error::TokenInvalid => "Invitation token is invalid".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => match db_err.duplicate_user_field() {
                    Some(DuplicateField::Email) => "An account with this email address already exists".to_string(),
                    Some(DuplicateField::Username) => "This username is already taken".to_string(),
                    None => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Internal server error".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::BasicAuthRequired | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. }
            | Error::AlreadyExists { .. }
            | Error::NotFound { .. }
            | Error::TokenExpired
            | Error::TokenInvalid => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = Json(json!({ "error": self.user_message() }));

        let mut response = (status, body).into_response();
        if matches!(self, Error::BasicAuthRequired) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_AUTH_CHALLENGE));
        }
        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
