//! API request and response data models.
//!
//! These are distinct from the database models so the wire contract can evolve independently of
//! storage. Password hashes and invitation digests never appear in any of them.

pub mod auth;
pub mod health;
pub mod posts;
pub mod users;
