use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::UserId;

/// Database request for recording an invitation. Holds the digest, never the plaintext.
#[derive(Debug, Clone)]
pub struct InvitationCreateDBRequest {
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvitationDBResponse {
    pub token_digest: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of trying to consume an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The user was activated and the invitation consumed
    Activated(UserId),
    /// An invitation matched but is past its expiry; nothing changed
    Expired,
    /// No pending invitation matched
    Invalid,
}
