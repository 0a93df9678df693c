//! Password hashing and invitation token handling.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::{config::PasswordConfig, errors::Error};

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Check a plaintext password against the configured length bounds (in bytes).
pub fn check_length(password: &str, policy: &PasswordConfig) -> Result<(), Error> {
    if password.len() < policy.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", policy.min_length),
        });
    }
    if password.len() > policy.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", policy.max_length),
        });
    }
    Ok(())
}

/// Hash a password with Argon2id after enforcing the length policy.
///
/// The output embeds a random salt, so two calls with the same input produce different strings.
/// [`verify_password`] is the deterministic half.
pub fn hash_password(password: &str, policy: &PasswordConfig) -> Result<String, Error> {
    check_length(password, policy)?;

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = policy.argon2_params().to_argon2()?;

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash. A mismatch is `Ok(false)`, never an error.
///
/// Verification uses the parameters embedded in the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Stand-in hash for accounts that do not exist, built once with the configured parameters.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Run a full verification that can never succeed.
///
/// Login calls this when the email is unknown so the response takes as long as a wrong password
/// against a real account.
pub fn verify_dummy(password: &str, policy: &PasswordConfig) -> Result<bool, Error> {
    let hash = match DUMMY_HASH.get() {
        Some(hash) => hash,
        None => {
            let salt = SaltString::generate(&mut OsRng);
            let hash = policy
                .argon2_params()
                .to_argon2()?
                .hash_password(generate_invitation_token().as_bytes(), &salt)
                .map_err(|e| Error::Internal {
                    operation: format!("hash dummy password: {e}"),
                })?
                .to_string();
            DUMMY_HASH.get_or_init(|| hash)
        }
    };

    verify_password(password, hash)?;
    Ok(false)
}

/// Generate the plaintext half of an invitation: 32 random bytes, base64url without padding.
pub fn generate_invitation_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Deterministic one-way digest of an invitation token. Only this form is stored.
pub fn digest_token(plaintext: &str) -> String {
    format!("{:x}", Sha256::digest(plaintext.as_bytes()))
}
