//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User role, drives the admin gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// User entity as stored in the database
///
/// `refresh_token` holds the single currently-valid refresh token for the
/// user; presenting any other refresh token fails with a mismatch. This is
/// a single-session-per-user policy.
#[derive(Debug, Clone, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_suspended: bool,
    pub is_verified: bool,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub login_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Redacted view of this user, safe to return to clients
    pub fn into_view(self) -> UserView {
        UserView {
            id: self.id,
            username: self.username,
            email: self.email,
            role: self.role,
            is_verified: self.is_verified,
            avatar: self.avatar,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

/// Client-facing user representation
///
/// Never carries the password hash or the stored refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub avatar: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// User login credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Payload for creating a local account from a Google profile
///
/// Carries no password: the store generates and hashes a random unusable
/// one only when it actually inserts a row.
#[derive(Debug, Clone)]
pub struct NewGoogleUser {
    pub username: String,
    pub email: String,
    pub google_id: String,
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_redacts_sensitive_fields() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "argon2-hash".to_string(),
            role: Role::Customer,
            is_suspended: false,
            is_verified: true,
            google_id: None,
            avatar: None,
            refresh_token: Some("a-refresh-token".to_string()),
            last_login: None,
            last_active: None,
            login_count: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&user.into_view()).unwrap();
        assert!(!json.contains("argon2-hash"));
        assert!(!json.contains("a-refresh-token"));
        assert!(json.contains("ada@example.com"));
    }
}
