//! Authentication service models

pub mod user;

// Re-export for convenience
pub use user::{LoginCredentials, NewGoogleUser, Role, User, UserView};
