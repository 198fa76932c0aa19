//! Shared error types for storefront infrastructure
//!
//! Domain errors live with their services; this module only covers the
//! infrastructure seams (database, cache) that several crates touch.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Custom error type for cache operations
///
/// The revocation store treats every variant as a degraded-backend signal
/// and fails open, so callers mostly care that this is distinct from a
/// negative lookup.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Error establishing or reusing a Redis connection
    #[error("Cache connection error: {0}")]
    Connection(#[source] redis::RedisError),

    /// Error executing a Redis command
    #[error("Cache command error: {0}")]
    Command(#[source] redis::RedisError),

    /// Configuration error
    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with CacheError
pub type CacheResult<T> = Result<T, CacheError>;
