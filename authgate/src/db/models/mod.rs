pub mod invitations;
pub mod posts;
pub mod roles;
pub mod users;
