//! Session issuer
//!
//! Orchestrates login, Google login, refresh, and logout. Every successful
//! issuance overwrites the user's stored refresh token, so at most one
//! refresh token per user is ever honored: presenting a rotated-out token
//! fails the equality check with `REFRESH_TOKEN_MISMATCH`. Access tokens
//! become terminally unusable via the revocation list; refresh tokens via
//! that equality check.

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AuthError;
use crate::jwt::{ExpiryProfile, JwtService, TokenType};
use crate::models::{LoginCredentials, NewGoogleUser, UserView};
use crate::oauth::GoogleVerifier;
use crate::repositories::UserStore;
use crate::revocation::RevocationStore;
use crate::validation;

/// A freshly minted access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Result of a successful password login
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: UserView,
    pub tokens: TokenPair,
}

/// Result of a successful Google login
#[derive(Debug)]
pub struct GoogleLoginOutcome {
    pub user: UserView,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

/// Session issuer service, generic over its user store
#[derive(Clone)]
pub struct SessionService<S> {
    repository: S,
    jwt: JwtService,
    revocation: RevocationStore,
    google: GoogleVerifier,
}

impl<S: UserStore> SessionService<S> {
    /// Create a new session service
    pub fn new(
        repository: S,
        jwt: JwtService,
        revocation: RevocationStore,
        google: GoogleVerifier,
    ) -> Self {
        Self {
            repository,
            jwt,
            revocation,
            google,
        }
    }

    /// Authenticate with email and password and issue a token pair
    ///
    /// Unknown email, wrong password, and unverified account all collapse to
    /// `InvalidCredentials` so responses cannot be used to enumerate
    /// accounts.
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        remember: bool,
        fingerprint: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        if validation::validate_email(&credentials.email).is_err()
            || validation::validate_password(&credentials.password).is_err()
        {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .repository
            .find_by_email(&credentials.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .repository
            .verify_password(&user, &credentials.password)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(AuthError::InvalidCredentials);
        }

        if user.is_suspended {
            return Err(AuthError::AccountSuspended);
        }

        let tokens = self.issue_pair(user.id, remember, fingerprint).await?;
        self.repository.record_login(user.id).await?;

        info!("User {} logged in", user.id);

        Ok(LoginOutcome {
            user: user.into_view(),
            tokens,
        })
    }

    /// Authenticate with a Google ID token and issue a token pair
    ///
    /// The provider token's signature and audience are verified out-of-band,
    /// and the provider must report the email as verified. Account matching
    /// is by email first, then by Google subject id; the store creates a
    /// local user (with a random unusable password) only when neither
    /// matches.
    pub async fn login_with_google(
        &self,
        id_token: &str,
        remember: bool,
        fingerprint: Option<&str>,
    ) -> Result<GoogleLoginOutcome, AuthError> {
        let profile = self
            .google
            .verify_id_token(id_token)
            .await
            .map_err(|e| {
                warn!("Google ID token verification failed: {:#}", e);
                AuthError::InvalidProviderToken
            })?;

        if !profile.email_verified {
            return Err(AuthError::InvalidProviderToken);
        }

        let username = profile
            .name
            .clone()
            .unwrap_or_else(|| profile.email.clone());

        let new_user = NewGoogleUser {
            username,
            email: profile.email.clone(),
            google_id: profile.sub.clone(),
            avatar: profile.picture.clone(),
        };

        let (user, is_new_user) = self
            .repository
            .find_or_create_from_google(&new_user)
            .await?;

        if user.is_suspended {
            return Err(AuthError::AccountSuspended);
        }

        let tokens = self.issue_pair(user.id, remember, fingerprint).await?;
        self.repository.record_login(user.id).await?;

        info!(
            "User {} logged in via Google (new account: {})",
            user.id, is_new_user
        );

        Ok(GoogleLoginOutcome {
            user: user.into_view(),
            tokens,
            is_new_user,
        })
    }

    /// Exchange a refresh token for a brand-new token pair (rotation)
    ///
    /// The presented string must exactly equal the user's currently stored
    /// refresh token; anything else, including a previously issued
    /// not-yet-expired token, fails with `RefreshMismatch`. On success the
    /// old refresh token is permanently unusable because the stored value is
    /// overwritten.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        remember: bool,
        fingerprint: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .jwt
            .verify(refresh_token, TokenType::Refresh, fingerprint)?;

        let user = self
            .repository
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.refresh_token.as_deref() != Some(refresh_token) {
            warn!(
                "Refresh token mismatch for user {} (rotated-out or foreign token)",
                user.id
            );
            return Err(AuthError::RefreshMismatch);
        }

        if user.is_suspended {
            return Err(AuthError::AccountSuspended);
        }

        let tokens = self.issue_pair(user.id, remember, fingerprint).await?;
        self.repository.touch_last_active(user.id).await?;

        Ok(tokens)
    }

    /// Terminate the session for a user
    ///
    /// Revoking the access token is best-effort (the revocation store
    /// degrades internally and never errors out of a logout); clearing the
    /// stored refresh token is what makes the refresh token terminally
    /// unusable.
    pub async fn logout(&self, access_token: Option<&str>, user_id: Uuid) -> Result<(), AuthError> {
        if let Some(token) = access_token {
            self.revocation.revoke(token).await;
        }

        self.repository.clear_refresh_token(user_id).await?;
        info!("User {} logged out", user_id);

        Ok(())
    }

    /// Load the redacted view for an authenticated user
    pub async fn current_user(&self, user_id: Uuid) -> Result<UserView, AuthError> {
        let user = self
            .repository
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.repository.touch_last_active(user_id).await?;

        Ok(user.into_view())
    }

    /// Mint a pair under the remember-me profile and persist the refresh
    /// token, rotating out any prior one
    async fn issue_pair(
        &self,
        user_id: Uuid,
        remember: bool,
        fingerprint: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let profile = ExpiryProfile::from_remember(remember);

        let access_token = self
            .jwt
            .mint(user_id, TokenType::Access, profile, fingerprint)?;
        let refresh_token = self
            .jwt
            .mint(user_id, TokenType::Refresh, profile, fingerprint)?;

        self.repository
            .store_refresh_token(user_id, &refresh_token)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.expiry_secs(TokenType::Access, profile),
        })
    }

    /// Access to the JWT service for the request gate
    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Access to the revocation store for the request gate
    pub fn revocation(&self) -> &RevocationStore {
        &self.revocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use crate::models::{Role, User};
    use crate::oauth::GoogleAuthConfig;
    use anyhow::Result;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory user store; passwords compare as plaintext here
    #[derive(Clone, Default)]
    struct MemoryStore {
        users: Arc<Mutex<HashMap<Uuid, User>>>,
    }

    impl MemoryStore {
        fn with_user(user: User) -> Self {
            let store = Self::default();
            store.users.lock().unwrap().insert(user.id, user);
            store
        }

        fn suspend(&self, user_id: Uuid) {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.is_suspended = true;
            }
        }
    }

    impl UserStore for MemoryStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn find_or_create_from_google(
            &self,
            new_user: &NewGoogleUser,
        ) -> Result<(User, bool)> {
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.values().find(|u| u.email == new_user.email) {
                return Ok((user.clone(), false));
            }
            let user = customer(&new_user.email, "google-oauth");
            users.insert(user.id, user.clone());
            Ok((user, true))
        }

        async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.refresh_token = Some(refresh_token.to_string());
            }
            Ok(())
        }

        async fn clear_refresh_token(&self, user_id: Uuid) -> Result<()> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.refresh_token = None;
            }
            Ok(())
        }

        async fn record_login(&self, user_id: Uuid) -> Result<()> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.login_count += 1;
                user.last_login = Some(Utc::now());
            }
            Ok(())
        }

        async fn touch_last_active(&self, user_id: Uuid) -> Result<()> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.last_active = Some(Utc::now());
            }
            Ok(())
        }

        fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
            Ok(user.password_hash == password)
        }
    }

    fn customer(email: &str, password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: email.to_string(),
            password_hash: password.to_string(),
            role: Role::Customer,
            is_suspended: false,
            is_verified: true,
            google_id: None,
            avatar: None,
            refresh_token: None,
            last_login: None,
            last_active: None,
            login_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn service(store: MemoryStore) -> SessionService<MemoryStore> {
        let jwt = JwtService::new(JwtConfig {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            extended_access_token_expiry: 604_800,
            extended_refresh_token_expiry: 2_592_000,
        });
        let revocation = RevocationStore::new(None, 900).await;
        let google = GoogleVerifier::new(GoogleAuthConfig {
            client_id: "test-client".to_string(),
            tokeninfo_url: "http://127.0.0.1:1/tokeninfo".to_string(),
        });

        SessionService::new(store, jwt, revocation, google)
    }

    fn credentials(email: &str, password: &str) -> LoginCredentials {
        LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rotation_rejects_prior_refresh_token() {
        let user = customer("ada@example.com", "correct-horse");
        let svc = service(MemoryStore::with_user(user)).await;

        let outcome = svc
            .login(&credentials("ada@example.com", "correct-horse"), false, None)
            .await
            .unwrap();
        let first_refresh = outcome.tokens.refresh_token;

        let rotated = svc.refresh(&first_refresh, false, None).await.unwrap();
        assert_ne!(rotated.refresh_token, first_refresh);

        // The rotated-out token is still unexpired and well-signed, but the
        // stored-value equality check rejects it.
        let err = svc.refresh(&first_refresh, false, None).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshMismatch));

        // The current token keeps working.
        svc.refresh(&rotated.refresh_token, false, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_rejects_suspended_account() {
        let mut user = customer("ada@example.com", "correct-horse");
        user.is_suspended = true;
        let svc = service(MemoryStore::with_user(user)).await;

        let err = svc
            .login(&credentials("ada@example.com", "correct-horse"), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountSuspended));
    }

    #[tokio::test]
    async fn test_refresh_rejects_account_suspended_mid_session() {
        let user = customer("ada@example.com", "correct-horse");
        let user_id = user.id;
        let store = MemoryStore::with_user(user);
        let svc = service(store.clone()).await;

        let outcome = svc
            .login(&credentials("ada@example.com", "correct-horse"), false, None)
            .await
            .unwrap();

        store.suspend(user_id);

        let err = svc
            .refresh(&outcome.tokens.refresh_token, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountSuspended));
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
        let svc = service(MemoryStore::with_user(customer(
            "ada@example.com",
            "correct-horse",
        )))
        .await;

        let unknown = svc
            .login(&credentials("nobody@example.com", "whatever"), false, None)
            .await
            .unwrap_err();
        let wrong = svc
            .login(&credentials("ada@example.com", "not-the-password"), false, None)
            .await
            .unwrap_err();

        assert_eq!(unknown.code(), wrong.code());
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_logout_makes_refresh_token_unusable() {
        let user = customer("ada@example.com", "correct-horse");
        let user_id = user.id;
        let svc = service(MemoryStore::with_user(user)).await;

        let outcome = svc
            .login(&credentials("ada@example.com", "correct-horse"), false, None)
            .await
            .unwrap();

        svc.logout(None, user_id).await.unwrap();

        let err = svc
            .refresh(&outcome.tokens.refresh_token, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshMismatch));
    }
}
