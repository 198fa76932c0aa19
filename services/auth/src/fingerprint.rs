//! Client fingerprint generation
//!
//! Derives a stable digest from connection and client attributes so a token
//! can be softly bound to the context that requested it. The digest is not
//! secret and is not an authentication factor on its own; a mismatch merely
//! invalidates the token as a tamper/replay deterrent.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Compute a fingerprint digest from client attributes
///
/// Components that are absent are simply omitted from the join rather than
/// replaced with placeholders, so the same client context always yields the
/// same digest. Returns `None` when no component is available at all.
pub fn fingerprint(
    ip: Option<&str>,
    user_agent: Option<&str>,
    accept_language: Option<&str>,
) -> Option<String> {
    let parts: Vec<&str> = [ip, user_agent, accept_language]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        return None;
    }

    let digest = Sha256::digest(parts.join("|").as_bytes());
    Some(format!("{:x}", digest))
}

/// Derive the fingerprint for an incoming request from its headers
///
/// The client address comes from the proxy headers (`x-forwarded-for`, then
/// `x-real-ip`) since the service runs behind a reverse proxy in every
/// deployment.
pub fn client_fingerprint(headers: &HeaderMap) -> Option<String> {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()));

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let accept_language = headers
        .get(axum::http::header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());

    fingerprint(ip, user_agent, accept_language)
}
