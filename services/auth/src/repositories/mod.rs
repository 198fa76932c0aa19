//! Data access layer for the authentication service

use anyhow::Result;
use uuid::Uuid;

use crate::models::{NewGoogleUser, User};

pub mod user;

pub use user::UserRepository;

/// Storage operations the session issuer depends on
///
/// [`UserRepository`] is the Postgres implementation; tests substitute an
/// in-memory store, the same seam the client crate has for its refresh
/// transport.
pub trait UserStore: Clone + Send + Sync {
    /// Find a user by ID
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Find a user by email
    fn find_by_email(&self, email: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Find or create a user for a verified Google profile; returns the
    /// user and whether it was newly created
    fn find_or_create_from_google(
        &self,
        new_user: &NewGoogleUser,
    ) -> impl Future<Output = Result<(User, bool)>> + Send;

    /// Overwrite the user's stored refresh token, rotating out any prior one
    fn store_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear the user's stored refresh token (logout)
    fn clear_refresh_token(&self, user_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// Update login bookkeeping after a successful authentication
    fn record_login(&self, user_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// Refresh the last-active timestamp
    fn touch_last_active(&self, user_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// Verify a user's password against the stored hash
    fn verify_password(&self, user: &User, password: &str) -> Result<bool>;
}
