//! Storefront API client with automatic token refresh
//!
//! This crate implements the client half of the session protocol: requests
//! carry the current access token, a 401 triggers a refresh-token exchange,
//! and the original request is retried exactly once with the new token.
//! Concurrent 401s are collapsed into a single in-flight refresh by the
//! [`coordinator::RefreshCoordinator`]; every waiting request resumes with
//! the same fresh token, or all of them fail together and the stored
//! credentials are cleared.

pub mod api;
pub mod coordinator;
pub mod transport;

pub use api::{ApiClient, ClientError};
pub use coordinator::RefreshCoordinator;
pub use transport::{HttpRefresher, RefreshError, TokenPair, TokenRefresher};
