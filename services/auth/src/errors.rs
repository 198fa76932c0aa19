//! Error taxonomy for the session security core
//!
//! Every failure that can reach a client carries a machine-readable code so
//! the storefront frontend can branch on it (refresh on `TOKEN_EXPIRED`,
//! hard logout on `REFRESH_TOKEN_MISMATCH`, and so on). Token errors are
//! categorized internally for logging but collapse to 401 on the wire, with
//! suspension and authorization failures mapping to 403 instead.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::jwt::TokenError;

/// Authentication and authorization errors surfaced by the auth service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad email, bad password, or unverified account. Deliberately a single
    /// variant so the response never distinguishes which part was wrong.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The account exists but is suspended
    #[error("Account is suspended")]
    AccountSuspended,

    /// No token was supplied in the authorization header or cookie
    #[error("Authentication token is missing")]
    NoToken,

    /// The token's expiry claim has elapsed
    #[error("Authentication token has expired")]
    TokenExpired,

    /// The token failed signature, claim, or fingerprint checks
    #[error("Authentication token is invalid")]
    InvalidToken,

    /// A token of the wrong class was presented (e.g. refresh where access
    /// is expected). The client must not attempt a refresh for this.
    #[error("Wrong token type for this endpoint")]
    InvalidTokenType,

    /// The token was explicitly revoked before its natural expiry
    #[error("Authentication token has been invalidated")]
    TokenInvalidated,

    /// The presented refresh token is not the user's currently stored one
    #[error("Refresh token does not match the active session")]
    RefreshMismatch,

    /// The token's subject no longer resolves to a user record
    #[error("User account not found")]
    UserNotFound,

    /// The endpoint requires the admin role
    #[error("Administrator privileges required")]
    AdminRequired,

    /// The OAuth provider token failed verification
    #[error("Provider token could not be verified")]
    InvalidProviderToken,

    /// Too many attempts from this client
    #[error("Too many attempts, please try again later")]
    RateLimited,

    /// Anything unexpected. Logged server-side, never detailed to clients.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Machine-readable error code included in every error response
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountSuspended => "ACCOUNT_SUSPENDED",
            AuthError::NoToken => "NO_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::InvalidTokenType => "INVALID_TOKEN_TYPE",
            AuthError::TokenInvalidated => "TOKEN_INVALIDATED",
            AuthError::RefreshMismatch => "REFRESH_TOKEN_MISMATCH",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::AdminRequired => "ADMIN_REQUIRED",
            AuthError::InvalidProviderToken => "INVALID_PROVIDER_TOKEN",
            AuthError::RateLimited => "TOO_MANY_ATTEMPTS",
            AuthError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status for this error: 401 for authentication failures, 403 for
    /// authorization and suspension, 429 for rate limiting
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AccountSuspended | AuthError::AdminRequired => StatusCode::FORBIDDEN,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::TypeMismatch => AuthError::InvalidTokenType,
            TokenError::InvalidSignature
            | TokenError::FingerprintMismatch
            | TokenError::Malformed(_) => AuthError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::Internal(e) => {
                error!("Internal error while handling auth request: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_map_to_401() {
        for err in [
            AuthError::NoToken,
            AuthError::TokenExpired,
            AuthError::InvalidToken,
            AuthError::InvalidTokenType,
            AuthError::TokenInvalidated,
            AuthError::RefreshMismatch,
            AuthError::UserNotFound,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "{}", err.code());
        }
    }

    #[test]
    fn test_authorization_errors_map_to_403() {
        assert_eq!(AuthError::AccountSuspended.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::AdminRequired.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_token_error_conversion() {
        assert_eq!(
            AuthError::from(TokenError::Expired).code(),
            "TOKEN_EXPIRED"
        );
        assert_eq!(
            AuthError::from(TokenError::TypeMismatch).code(),
            "INVALID_TOKEN_TYPE"
        );
        assert_eq!(
            AuthError::from(TokenError::InvalidSignature).code(),
            "INVALID_TOKEN"
        );
    }
}
