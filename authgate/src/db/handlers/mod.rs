//! Postgres repositories. Each wraps a borrowed connection so callers decide whether work runs
//! inside a transaction.

pub mod invitations;
pub mod posts;
pub mod roles;
pub mod users;

pub use invitations::Invitations;
pub use posts::Posts;
pub use roles::Roles;
pub use users::Users;
