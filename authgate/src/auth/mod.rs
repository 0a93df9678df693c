//! Authentication and authorization.
//!
//! - [`password`]: credential hashing and invitation token digests
//! - [`token`]: bearer token issuance and validation
//! - [`basic`]: operator Basic gate
//! - [`middleware`]: Bearer gate with cache-aside principal resolution
//! - [`current_user`]: the [`current_user::Principal`] extractor
//! - [`permissions`]: role level and ownership checks

pub mod basic;
pub mod current_user;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod token;
