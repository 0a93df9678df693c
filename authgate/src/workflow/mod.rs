//! Multi-step operations with rollback.

pub mod registration;
pub mod saga;
