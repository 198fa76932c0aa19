//! JWT service for token generation and validation
//!
//! This module provides the token codec: short-lived access tokens and
//! longer-lived refresh tokens, signed with independent HS256 secrets so
//! that possession of one type's secret cannot forge the other. Every token
//! pins the deployment's issuer and audience, and can optionally embed a
//! client fingerprint digest that is re-checked on verification.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Issuer claim stamped into every minted token
pub const TOKEN_ISSUER: &str = "storefront-auth";
/// Audience claim stamped into every minted token
pub const TOKEN_AUDIENCE: &str = "storefront-web";

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret for signing and verifying access tokens
    pub access_secret: String,
    /// Secret for signing and verifying refresh tokens
    pub refresh_secret: String,
    /// Access token expiry in seconds for a standard session (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiry in seconds for a standard session (default: 7 days)
    pub refresh_token_expiry: u64,
    /// Access token expiry in seconds for a remembered session (default: 7 days)
    pub extended_access_token_expiry: u64,
    /// Refresh token expiry in seconds for a remembered session (default: 30 days)
    pub extended_refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// Missing secrets are a fatal startup condition, never a per-request
    /// error.
    ///
    /// # Environment Variables
    /// - `JWT_ACCESS_SECRET`: secret for access tokens (required)
    /// - `JWT_REFRESH_SECRET`: secret for refresh tokens (required)
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: standard access expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: standard refresh expiry in seconds (default: 604800)
    /// - `JWT_EXTENDED_ACCESS_TOKEN_EXPIRY`: remembered access expiry (default: 604800)
    /// - `JWT_EXTENDED_REFRESH_TOKEN_EXPIRY`: remembered refresh expiry (default: 2592000)
    pub fn from_env() -> anyhow::Result<Self> {
        let access_secret = std::env::var("JWT_ACCESS_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_ACCESS_SECRET environment variable not set"))?;
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_REFRESH_SECRET environment variable not set"))?;

        if access_secret == refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let parse_expiry = |var: &str, default: u64| -> u64 {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Ok(JwtConfig {
            access_secret,
            refresh_secret,
            access_token_expiry: parse_expiry("JWT_ACCESS_TOKEN_EXPIRY", 900),
            refresh_token_expiry: parse_expiry("JWT_REFRESH_TOKEN_EXPIRY", 604_800),
            extended_access_token_expiry: parse_expiry(
                "JWT_EXTENDED_ACCESS_TOKEN_EXPIRY",
                604_800,
            ),
            extended_refresh_token_expiry: parse_expiry(
                "JWT_EXTENDED_REFRESH_TOKEN_EXPIRY",
                2_592_000,
            ),
        })
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived credential authorizing individual API calls
    Access,
    /// Longer-lived credential exchanged for a new token pair
    Refresh,
}

/// Expiry profile selected by the remember-me flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryProfile {
    /// Short-lived session (~15 min access / ~7 day refresh)
    Standard,
    /// Remembered session (~7 day access / ~30 day refresh)
    Extended,
}

impl ExpiryProfile {
    /// Map the caller-supplied remember-me flag to a profile
    pub fn from_remember(remember: bool) -> Self {
        if remember {
            ExpiryProfile::Extended
        } else {
            ExpiryProfile::Standard
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Issued at time (epoch seconds)
    pub iat: u64,
    /// Expiration time (epoch seconds)
    pub exp: u64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Client fingerprint digest, when one was available at mint time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fpt: Option<String>,
}

/// Typed token verification failures
///
/// Kept separate so callers can log the category while the HTTP layer
/// collapses most of them to a uniform 401.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    /// Signature did not verify under the secret for the expected type
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The exp claim has elapsed
    #[error("token has expired")]
    Expired,

    /// The embedded token_type does not match what the endpoint expects
    #[error("token type mismatch")]
    TypeMismatch,

    /// A fingerprint was embedded at mint time and a different one was
    /// presented at verification
    #[error("token fingerprint mismatch")]
    FingerprintMismatch,

    /// The token could not be decoded at all
    #[error("token is malformed: {0}")]
    Malformed(String),
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service from secret material
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        JwtService {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Mint a token for a subject
    ///
    /// The expiry profile selects between the standard and remembered
    /// lifetimes; the optional fingerprint digest is embedded verbatim and
    /// re-checked by [`JwtService::verify`].
    pub fn mint(
        &self,
        subject: Uuid,
        token_type: TokenType,
        profile: ExpiryProfile,
        fingerprint: Option<&str>,
    ) -> Result<String, TokenError> {
        let now = now_secs();

        let claims = Claims {
            sub: subject,
            token_type,
            iat: now,
            exp: now + self.expiry_secs(token_type, profile),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            fpt: fingerprint.map(|f| f.to_string()),
        };

        let key = match token_type {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// Verify a token of an expected type and return its claims
    ///
    /// Verification happens under the secret for `expected_type`, so a token
    /// of the other class fails with `InvalidSignature` before its claims
    /// are even inspected. Issuer and audience are validated on every
    /// decode. When the token embeds a fingerprint and the caller supplies
    /// one, the two must match.
    pub fn verify(
        &self,
        token: &str,
        expected_type: TokenType,
        fingerprint: Option<&str>,
    ) -> Result<Claims, TokenError> {
        let key = match expected_type {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let data = decode::<Claims>(token, key, &self.validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;

        let claims = data.claims;

        if claims.token_type != expected_type {
            return Err(TokenError::TypeMismatch);
        }

        if let (Some(embedded), Some(presented)) = (claims.fpt.as_deref(), fingerprint) {
            if embedded != presented {
                return Err(TokenError::FingerprintMismatch);
            }
        }

        Ok(claims)
    }

    /// Lifetime in seconds for a given token type under a profile
    pub fn expiry_secs(&self, token_type: TokenType, profile: ExpiryProfile) -> u64 {
        match (token_type, profile) {
            (TokenType::Access, ExpiryProfile::Standard) => self.config.access_token_expiry,
            (TokenType::Access, ExpiryProfile::Extended) => {
                self.config.extended_access_token_expiry
            }
            (TokenType::Refresh, ExpiryProfile::Standard) => self.config.refresh_token_expiry,
            (TokenType::Refresh, ExpiryProfile::Extended) => {
                self.config.extended_refresh_token_expiry
            }
        }
    }
}

/// Read a token's remaining lifetime from its own exp claim without
/// verifying the signature
///
/// Used by the revocation store to size entry TTLs; a token that cannot be
/// decoded at all yields `None` and the store falls back to a default
/// window.
pub fn remaining_lifetime(token: &str) -> Option<u64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data =
        decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let exp = data.claims.get("exp")?.as_u64()?;
    Some(exp.saturating_sub(now_secs()))
}

/// Current time as epoch seconds
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
