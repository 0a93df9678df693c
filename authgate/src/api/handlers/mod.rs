//! HTTP request handlers.
//!
//! - [`auth`]: registration, activation and token issuance (public)
//! - [`health`]: operational health check (Basic gate)
//! - [`users`]: user lookup (Bearer gate)
//! - [`posts`]: user-owned posts guarded by the ownership gate (Bearer gate)
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a JSON error body.

pub mod auth;
pub mod health;
pub mod posts;
pub mod users;
