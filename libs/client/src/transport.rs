//! Refresh transport seam
//!
//! The coordinator only needs "exchange this refresh token for a new pair",
//! expressed as the [`TokenRefresher`] trait so tests can substitute a
//! scripted implementation for the HTTP one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An access/refresh token pair as returned by the auth service
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// Failures of a refresh attempt
///
/// Carries strings rather than transport error types so one failure can be
/// fanned out to every queued waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The auth service rejected the refresh token; the session is over and
    /// the only recovery is a new login
    #[error("session has expired")]
    SessionExpired,

    /// The refresh request could not be completed
    #[error("refresh transport error: {0}")]
    Transport(String),

    /// The auth service answered with something unexpected
    #[error("refresh protocol error: {0}")]
    Protocol(String),
}

/// Exchange a refresh token for a new token pair
pub trait TokenRefresher {
    fn refresh(
        &self,
        refresh_token: &str,
        remember: bool,
    ) -> impl Future<Output = Result<TokenPair, RefreshError>> + Send;
}

/// Request body for the refresh endpoint
#[derive(Serialize)]
struct RefreshRequestBody<'a> {
    refresh_token: &'a str,
    remember_me: bool,
}

/// Production refresher speaking to the auth service over HTTP
#[derive(Clone)]
pub struct HttpRefresher {
    http: reqwest::Client,
    refresh_url: String,
}

impl HttpRefresher {
    /// Create a refresher pointed at the auth service's refresh endpoint
    pub fn new(http: reqwest::Client, refresh_url: impl Into<String>) -> Self {
        Self {
            http,
            refresh_url: refresh_url.into(),
        }
    }
}

impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str, remember: bool) -> Result<TokenPair, RefreshError> {
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequestBody {
                refresh_token,
                remember_me: remember,
            })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Mismatch, expiry, revocation, suspension: all terminal.
            return Err(RefreshError::SessionExpired);
        }

        if !status.is_success() {
            return Err(RefreshError::Protocol(format!(
                "unexpected refresh status {}",
                status
            )));
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| RefreshError::Protocol(e.to_string()))
    }
}
