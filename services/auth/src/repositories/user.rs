//! User repository for database operations
//!
//! The session issuer owns all mutations of the session fields on the user
//! row (`refresh_token`, `last_login`, `last_active`, `login_count`); this
//! repository is its only path to them. The `users.email` and
//! `users.google_id` columns carry unique indexes (see migrations), which
//! together with the transactional find-or-create below prevent duplicate
//! accounts under concurrent OAuth logins.

use anyhow::Result;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::RngCore;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{NewGoogleUser, User};
use crate::repositories::UserStore;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_suspended, is_verified, \
     google_id, avatar, refresh_token, last_login, last_active, login_count, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find or create a user for a verified Google profile
    ///
    /// Matches by email first (so an existing local account is linked rather
    /// than duplicated), then by Google subject id, and only creates a new
    /// row when neither matches. A brand-new row gets a random unusable
    /// password, hashed here so repeat logins never pay the argon2 cost.
    ///
    /// Two concurrent logins for the same new email both reach the insert;
    /// the unique email index lets only one row through, the other insert
    /// resolves to no row via `ON CONFLICT DO NOTHING` once the winner
    /// commits, and the loser adopts the winner's row.
    ///
    /// Returns the user and whether it was newly created.
    pub async fn find_or_create_from_google(&self, new_user: &NewGoogleUser) -> Result<(User, bool)> {
        let mut tx = self.pool.begin().await?;

        let by_email = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(&new_user.email)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = by_email {
            // Link the Google identity to the existing local account.
            let user = sqlx::query_as::<_, User>(&format!(
                "UPDATE users SET google_id = COALESCE(google_id, $2), \
                 avatar = COALESCE(avatar, $3), updated_at = NOW() \
                 WHERE id = $1 RETURNING {}",
                USER_COLUMNS
            ))
            .bind(user.id)
            .bind(&new_user.google_id)
            .bind(&new_user.avatar)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            return Ok((user, false));
        }

        let by_google_id = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE google_id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(&new_user.google_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = by_google_id {
            tx.commit().await?;
            return Ok((user, false));
        }

        info!("Creating new user from Google profile: {}", new_user.email);

        let password_hash = self.hash_password(&random_password())?;
        let inserted = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash, role, is_verified, google_id, avatar) \
             VALUES ($1, $2, $3, 'customer', TRUE, $4, $5) ON CONFLICT DO NOTHING RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&password_hash)
        .bind(&new_user.google_id)
        .bind(&new_user.avatar)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = inserted {
            tx.commit().await?;
            return Ok((user, true));
        }

        // Lost the race: the winner's row is committed by the time the
        // conflict resolves, so it is visible to a fresh read here.
        let winner = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1 OR google_id = $2",
            USER_COLUMNS
        ))
        .bind(&new_user.email)
        .bind(&new_user.google_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| anyhow::anyhow!("concurrent signup row vanished for {}", new_user.email))?;

        tx.commit().await?;
        Ok((winner, false))
    }

    /// Overwrite the user's stored refresh token, rotating out any prior one
    pub async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear the user's stored refresh token (logout)
    pub async fn clear_refresh_token(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update login bookkeeping after a successful authentication
    pub async fn record_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE users SET last_login = NOW(), last_active = NOW(), \
             login_count = login_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Refresh the last-active timestamp
    pub async fn touch_last_active(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_active = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Verify a user's password against the stored argon2 hash
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

        let argon2 = Argon2::default();
        Ok(argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password for storage
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(hash)
    }
}

impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserRepository::find_by_id(self, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        UserRepository::find_by_email(self, email).await
    }

    async fn find_or_create_from_google(&self, new_user: &NewGoogleUser) -> Result<(User, bool)> {
        UserRepository::find_or_create_from_google(self, new_user).await
    }

    async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
        UserRepository::store_refresh_token(self, user_id, refresh_token).await
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<()> {
        UserRepository::clear_refresh_token(self, user_id).await
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        UserRepository::record_login(self, user_id).await
    }

    async fn touch_last_active(&self, user_id: Uuid) -> Result<()> {
        UserRepository::touch_last_active(self, user_id).await
    }

    fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        UserRepository::verify_password(self, user, password)
    }
}

/// Random unusable password for provider-created accounts
fn random_password() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_password_is_unpredictable() {
        let a = random_password();
        let b = random_password();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    fn google_signup(email: &str) -> NewGoogleUser {
        NewGoogleUser {
            username: "Race Tester".to_string(),
            email: email.to_string(),
            google_id: format!("g-{}", Uuid::new_v4()),
            avatar: None,
        }
    }

    async fn connect() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PgPool::connect(&url).await.expect("Postgres must be up")
    }

    // Requires Postgres with the users schema at DATABASE_URL; run with
    // `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_concurrent_google_signup_creates_one_row() {
        let pool = connect().await;
        let repo = UserRepository::new(pool.clone());

        let email = format!("race-{}@example.com", Uuid::new_v4());
        let signup = google_signup(&email);

        let first = {
            let repo = repo.clone();
            let signup = signup.clone();
            tokio::spawn(async move { repo.find_or_create_from_google(&signup).await })
        };
        let second = {
            let repo = repo.clone();
            let signup = signup.clone();
            tokio::spawn(async move { repo.find_or_create_from_google(&signup).await })
        };

        let (user_a, created_a) = first.await.unwrap().unwrap();
        let (user_b, created_b) = second.await.unwrap().unwrap();

        assert_eq!(user_a.id, user_b.id);
        assert!(!(created_a && created_b), "both logins claimed creation");
        assert!(!user_a.password_hash.is_empty());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_repeat_google_login_reuses_row() {
        let pool = connect().await;
        let repo = UserRepository::new(pool);

        let email = format!("repeat-{}@example.com", Uuid::new_v4());
        let signup = google_signup(&email);

        let (created, is_new) = repo.find_or_create_from_google(&signup).await.unwrap();
        assert!(is_new);

        let (found, is_new) = repo.find_or_create_from_google(&signup).await.unwrap();
        assert!(!is_new);
        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash, created.password_hash);
    }
}
