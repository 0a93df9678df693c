//! Persistence: error mapping, row models, Postgres repositories and the store capabilities
//! built on them.

pub mod errors;
pub mod handlers;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod models;
pub mod storage;

pub use storage::{PgStore, PostStore, RoleStore, UserStore};
