//! Authentication service routes
//!
//! Tokens travel both in the JSON body (for bearer-header deployments) and
//! as http-only SameSite=Strict cookies (for cookie deployments); a
//! non-http-only `remember_me` cookie mirrors the flag so the frontend can
//! read it without a round trip.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware as axum_middleware};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::errors::AuthError;
use crate::fingerprint;
use crate::jwt::{ExpiryProfile, TokenType};
use crate::middleware::{ACCESS_TOKEN_COOKIE, AuthContext, auth_middleware, require_admin};
use crate::models::{LoginCredentials, UserView};
use crate::revocation::StoreStatus;
use crate::session::TokenPair;

/// Cookie carrying the refresh token
const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Non-http-only cookie mirroring the remember-me flag
const REMEMBER_ME_COOKIE: &str = "remember_me";

/// Request for password login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Request for Google login
#[derive(Deserialize)]
pub struct GoogleLoginRequest {
    pub id_token: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Request for token refresh; the token may come from the cookie instead
#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
    pub remember_me: Option<bool>,
}

/// Token pair in responses
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl From<&TokenPair> for TokenResponse {
    fn from(pair: &TokenPair) -> Self {
        TokenResponse {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

/// Response for login endpoints
#[derive(Serialize)]
pub struct LoginResponse {
    pub user: UserView,
    pub tokens: TokenResponse,
}

/// Response for Google login
#[derive(Serialize)]
pub struct GoogleLoginResponse {
    pub user: UserView,
    pub tokens: TokenResponse,
    pub is_new_user: bool,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin = Router::new()
        .route("/auth/admin/revocation-status", get(revocation_status))
        .route_layer(axum_middleware::from_fn(require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/google", post(google_login))
        .route("/auth/refresh", post(refresh))
        .merge(protected)
        .merge(admin)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Password login endpoint
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !state.rate_limiter.is_allowed(&client_key(&headers)).await {
        return Err(AuthError::RateLimited);
    }

    let credentials = LoginCredentials {
        email: payload.email,
        password: payload.password,
    };
    let fp = fingerprint::client_fingerprint(&headers);

    let outcome = state
        .session_service
        .login(&credentials, payload.remember_me, fp.as_deref())
        .await?;

    let jar = with_session_cookies(jar, &state, &outcome.tokens, payload.remember_me);
    let body = LoginResponse {
        tokens: TokenResponse::from(&outcome.tokens),
        user: outcome.user,
    };

    Ok((StatusCode::OK, jar, Json(body)))
}

/// Google login endpoint
pub async fn google_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !state.rate_limiter.is_allowed(&client_key(&headers)).await {
        return Err(AuthError::RateLimited);
    }

    let fp = fingerprint::client_fingerprint(&headers);

    let outcome = state
        .session_service
        .login_with_google(&payload.id_token, payload.remember_me, fp.as_deref())
        .await?;

    let status = if outcome.is_new_user {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let jar = with_session_cookies(jar, &state, &outcome.tokens, payload.remember_me);
    let body = GoogleLoginResponse {
        tokens: TokenResponse::from(&outcome.tokens),
        user: outcome.user,
        is_new_user: outcome.is_new_user,
    };

    Ok((status, jar, Json(body)))
}

/// Refresh endpoint: exchanges the refresh token for a rotated pair
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let refresh_token = payload
        .refresh_token
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AuthError::NoToken)?;

    let remember = payload.remember_me.unwrap_or_else(|| {
        jar.get(REMEMBER_ME_COOKIE)
            .map(|c| c.value() == "true")
            .unwrap_or(false)
    });

    let fp = fingerprint::client_fingerprint(&headers);

    let tokens = state
        .session_service
        .refresh(&refresh_token, remember, fp.as_deref())
        .await?;

    let jar = with_session_cookies(jar, &state, &tokens, remember);

    Ok((StatusCode::OK, jar, Json(TokenResponse::from(&tokens))))
}

/// Logout endpoint: revokes the access token and clears the session
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    state
        .session_service
        .logout(Some(&ctx.token), ctx.user.id)
        .await?;

    // Removal cookies must match the path the originals were set with.
    let jar = jar
        .remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/").build())
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/").build())
        .remove(Cookie::build(REMEMBER_ME_COOKIE).path("/").build());

    Ok((
        StatusCode::OK,
        jar,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Current-user endpoint
pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state.session_service.current_user(ctx.user.id).await?;
    Ok(Json(serde_json::json!({ "user": user })))
}

/// Revocation store status for operators
pub async fn revocation_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = match state.session_service.revocation().status().await {
        StoreStatus::Available => "available",
        StoreStatus::Degraded => "degraded",
    };

    info!("Revocation status queried: {}", status);
    Json(serde_json::json!({ "status": status }))
}

/// Rate-limiting key for a request, from the proxy headers
fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Attach the session cookies for a freshly minted pair
fn with_session_cookies(
    jar: CookieJar,
    state: &AppState,
    tokens: &TokenPair,
    remember: bool,
) -> CookieJar {
    let profile = ExpiryProfile::from_remember(remember);
    let jwt = state.session_service.jwt();

    let access = Cookie::build((ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(
            jwt.expiry_secs(TokenType::Access, profile) as i64,
        ))
        .build();

    let refresh = Cookie::build((REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(
            jwt.expiry_secs(TokenType::Refresh, profile) as i64,
        ))
        .build();

    // Readable by the frontend, carries no credential.
    let remember_cookie = Cookie::build((REMEMBER_ME_COOKIE, remember.to_string()))
        .path("/")
        .http_only(false)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(
            jwt.expiry_secs(TokenType::Refresh, profile) as i64,
        ))
        .build();

    jar.add(access).add(refresh).add(remember_cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_fallback() {
        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_refresh_request_accepts_empty_body() {
        let payload: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(payload.refresh_token.is_none());
        assert!(payload.remember_me.is_none());
    }
}
