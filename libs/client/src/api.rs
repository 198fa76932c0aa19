//! HTTP client wrapper with retry-after-refresh
//!
//! Attaches the current access token to every request and, on a 401 from a
//! non-exempt endpoint, refreshes through the coordinator and retries the
//! original request exactly once. A request that 401s twice is surfaced
//! as-is; there are no retry loops.

use thiserror::Error;
use tracing::debug;

use crate::coordinator::RefreshCoordinator;
use crate::transport::{RefreshError, TokenRefresher};

/// Endpoints whose 401s must never trigger a refresh: the auth endpoints
/// themselves (a 401 there is a real answer) and payment callbacks (a
/// retry could double-submit).
const REFRESH_EXEMPT_PREFIXES: &[&str] = &["/auth/", "/payment"];

/// Errors from the API client
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request itself could not be sent
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The automatic refresh failed; the session is gone
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

/// Storefront API client
pub struct ApiClient<R> {
    http: reqwest::Client,
    coordinator: RefreshCoordinator<R>,
}

impl<R: TokenRefresher> ApiClient<R> {
    /// Create a new API client
    pub fn new(http: reqwest::Client, coordinator: RefreshCoordinator<R>) -> Self {
        Self { http, coordinator }
    }

    /// The underlying HTTP client, for building requests
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The refresh coordinator, for session management and the
    /// session-expired signal
    pub fn coordinator(&self) -> &RefreshCoordinator<R> {
        &self.coordinator
    }

    /// Send a request with the current access token, refreshing and
    /// retrying once on 401
    pub async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        // Cloned up front; a streaming body that cannot be cloned simply
        // loses the retry and surfaces its 401.
        let retry = request.try_clone();

        let response = self.send_authorized(request).await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if is_refresh_exempt(response.url().path()) {
            return Ok(response);
        }

        let Some(retry) = retry else {
            return Ok(response);
        };

        debug!("401 received, refreshing and retrying once");
        self.coordinator.refresh_access_token().await?;

        // Retried exactly once; a second 401 is returned to the caller.
        self.send_authorized(retry).await
    }

    async fn send_authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let request = match self.coordinator.access_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        Ok(request.send().await?)
    }
}

/// Whether a path's 401 should be surfaced rather than trigger a refresh
fn is_refresh_exempt(path: &str) -> bool {
    REFRESH_EXEMPT_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_endpoints_are_exempt() {
        assert!(is_refresh_exempt("/auth/login"));
        assert!(is_refresh_exempt("/auth/refresh"));
        assert!(is_refresh_exempt("/payment/webhook"));
    }

    #[test]
    fn test_api_endpoints_are_not_exempt() {
        assert!(!is_refresh_exempt("/products"));
        assert!(!is_refresh_exempt("/orders/42"));
        assert!(!is_refresh_exempt("/cart"));
    }
}
