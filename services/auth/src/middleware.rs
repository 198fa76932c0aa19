//! Request gate middleware
//!
//! Single-pass validation for protected endpoints: extract a token from the
//! authorization header or cookie, reject revoked/expired/malformed tokens,
//! load and attach the user, and enforce suspension. Retries after a 401
//! are the client-side refresh coordinator's job, never this gate's.
//!
//! The authenticated identity travels as a typed [`AuthContext`] in the
//! request extensions rather than ad hoc mutation of shared state.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::AppState;
use crate::errors::AuthError;
use crate::fingerprint;
use crate::jwt::TokenType;
use crate::models::{Role, User, UserView};

/// Cookie carrying the access token when cookie transport is in use
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Authenticated request context attached by the gate
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Sanitized user (no password hash, no stored refresh token)
    pub user: UserView,
    /// The raw access token the request authenticated with; logout revokes
    /// exactly this string
    pub token: String,
}

/// Extract the access token from the authorization header, else the cookie
fn extract_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string())
}

/// Run the full gate pipeline for one request
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let jar = CookieJar::from_headers(headers);

    let token = extract_token(headers, &jar).ok_or(AuthError::NoToken)?;

    // Revocation first: a revoked token is rejected even while it is still
    // cryptographically valid. The store itself fails open on backend
    // errors.
    if state.session_service.revocation().is_revoked(&token).await {
        return Err(AuthError::TokenInvalidated);
    }

    let fp = fingerprint::client_fingerprint(headers);
    let claims = state
        .session_service
        .jwt()
        .verify(&token, TokenType::Access, fp.as_deref())
        .map_err(|e| {
            warn!("Access token rejected: {}", e);
            AuthError::from(e)
        })?;

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    gate_user(user, token)
}

/// Final gate step once the token has checked out and the user is loaded:
/// suspension trumps an otherwise valid token
fn gate_user(user: User, token: String) -> Result<AuthContext, AuthError> {
    if user.is_suspended {
        return Err(AuthError::AccountSuspended);
    }

    Ok(AuthContext {
        user: user.into_view(),
        token,
    })
}

/// Require an authenticated, non-suspended user
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Attach a user when the request carries a valid token, otherwise continue
/// anonymously
///
/// For endpoints that behave differently for authenticated callers without
/// requiring authentication. Never fails.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Ok(ctx) = authenticate(&state, req.headers()).await {
        req.extensions_mut().insert(ctx);
    }
    next.run(req).await
}

/// Require the admin role; runs after [`auth_middleware`]
pub async fn require_admin(req: Request<Body>, next: Next) -> Result<Response, AuthError> {
    let is_admin = req
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.user.role == Role::Admin)
        .unwrap_or(false);

    if !is_admin {
        return Err(AuthError::AdminRequired);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "argon2-hash".to_string(),
            role: Role::Customer,
            is_suspended: false,
            is_verified: true,
            google_id: None,
            avatar: None,
            refresh_token: None,
            last_login: None,
            last_active: None,
            login_count: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_suspended_user_rejected_despite_valid_token() {
        let mut user = sample_user();
        user.is_suspended = true;

        let result = gate_user(user, "a-valid-access-token".to_string());
        assert!(matches!(result, Err(AuthError::AccountSuspended)));
    }

    #[test]
    fn test_active_user_attached_with_raw_token() {
        let ctx = gate_user(sample_user(), "a-valid-access-token".to_string()).unwrap();
        assert_eq!(ctx.token, "a-valid-access-token");
        assert_eq!(ctx.user.email, "ada@example.com");
    }

    #[test]
    fn test_bearer_header_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer header-token".parse().unwrap());
        headers.insert(header::COOKIE, "access_token=cookie-token".parse().unwrap());

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(
            extract_token(&headers, &jar),
            Some("header-token".to_string())
        );
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "access_token=cookie-token".parse().unwrap());

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(
            extract_token(&headers, &jar),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn test_missing_token() {
        let headers = HeaderMap::new();
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(extract_token(&headers, &jar), None);
    }

    #[test]
    fn test_malformed_authorization_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(extract_token(&headers, &jar), None);
    }
}
