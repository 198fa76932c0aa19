//! Google sign-in verification
//!
//! The storefront frontend completes the Google flow in the browser and
//! posts the resulting ID token here. Verification happens out-of-band
//! against Google's tokeninfo endpoint, which checks the signature for us;
//! this module additionally pins the audience to our own client id and
//! surfaces whether Google considers the email verified.

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

/// Google sign-in configuration
#[derive(Debug, Clone)]
pub struct GoogleAuthConfig {
    /// OAuth client id; verified tokens must carry it as their audience
    pub client_id: String,
    /// Tokeninfo endpoint, overridable for tests
    pub tokeninfo_url: String,
}

impl GoogleAuthConfig {
    /// Create a new GoogleAuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `GOOGLE_CLIENT_ID`: OAuth client id (required)
    /// - `GOOGLE_TOKENINFO_URL`: verification endpoint
    ///   (default: "https://oauth2.googleapis.com/tokeninfo")
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("GOOGLE_CLIENT_ID environment variable not set"))?;

        let tokeninfo_url = std::env::var("GOOGLE_TOKENINFO_URL")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/tokeninfo".to_string());

        Ok(GoogleAuthConfig {
            client_id,
            tokeninfo_url,
        })
    }
}

/// Raw tokeninfo response
///
/// Google returns boolean-ish fields as strings here.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Verified Google profile
#[derive(Debug, Clone)]
pub struct GoogleProfile {
    /// Google subject id, stable per account
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Verifier for Google ID tokens
#[derive(Clone)]
pub struct GoogleVerifier {
    http: reqwest::Client,
    config: GoogleAuthConfig,
}

impl GoogleVerifier {
    /// Create a new verifier
    pub fn new(config: GoogleAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Verify an ID token and return the profile it attests to
    ///
    /// Fails when Google rejects the token (bad signature, expired) or when
    /// the audience is not our client id.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<GoogleProfile> {
        let response = self
            .http
            .get(&self.config.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Google rejected the ID token: {}", response.status());
        }

        let token_info: TokenInfo = response.json().await?;

        if token_info.aud != self.config.client_id {
            anyhow::bail!("ID token audience does not match our client id");
        }

        info!("Verified Google ID token for subject {}", token_info.sub);

        Ok(GoogleProfile {
            sub: token_info.sub,
            email: token_info.email,
            email_verified: token_info.email_verified == "true",
            name: token_info.name,
            picture: token_info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokeninfo_deserialization() {
        let json = r#"{
            "aud": "client-id-123.apps.googleusercontent.com",
            "sub": "110169484474386276334",
            "email": "ada@example.com",
            "email_verified": "true",
            "name": "Ada Lovelace",
            "picture": "https://example.com/photo.jpg",
            "iss": "https://accounts.google.com",
            "exp": "1714000000"
        }"#;

        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.aud, "client-id-123.apps.googleusercontent.com");
        assert_eq!(info.email_verified, "true");
        assert_eq!(info.name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_tokeninfo_missing_optional_fields() {
        let json = r#"{
            "aud": "client-id-123",
            "sub": "42",
            "email": "ada@example.com"
        }"#;

        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.email_verified, "");
        assert!(info.name.is_none());
        assert!(info.picture.is_none());
    }
}
