//! Token revocation store
//!
//! Records invalidated access tokens until their natural expiry. Entries
//! are keyed by a SHA-256 digest of the raw token so credentials are never
//! stored, and each entry's TTL is sized from the token's own exp claim.
//!
//! Redis is the primary backing store when configured. When it is not, or
//! when it becomes unreachable, an in-process map takes over with identical
//! semantics minus cross-process sharing. Lookups fail open on backend
//! errors: honoring a revoked-but-cryptographically-valid token for the
//! remainder of its short lifetime is preferred over blocking all
//! authenticated traffic.

use common::cache::RedisPool;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::jwt;

/// Redis key prefix for revocation entries
const REVOKED_KEY_PREFIX: &str = "revoked_token";

/// Health of the revocation backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// The configured backend (or the in-process map, when none is
    /// configured) is serving reads and writes
    Available,
    /// The configured backend is unreachable; only the in-process map is
    /// consulted until a reconnect succeeds
    Degraded,
}

/// Token revocation store with an in-process fallback
#[derive(Clone)]
pub struct RevocationStore {
    backend: Option<RedisPool>,
    status: Arc<RwLock<StoreStatus>>,
    fallback: Arc<Mutex<HashMap<String, u64>>>,
    default_ttl: u64,
}

impl RevocationStore {
    /// Create a new revocation store, probing backend health up front
    ///
    /// `backend: None` selects the pure in-process mode, which is considered
    /// `Available` since it is the configured mode of operation.
    pub async fn new(backend: Option<RedisPool>, default_ttl: u64) -> Self {
        let status = match &backend {
            None => {
                info!("Revocation store running in-process only (no Redis configured)");
                StoreStatus::Available
            }
            Some(pool) => match pool.health_check().await {
                Ok(true) => StoreStatus::Available,
                Ok(false) | Err(_) => {
                    warn!("Revocation backend unreachable at startup, running degraded");
                    StoreStatus::Degraded
                }
            },
        };

        RevocationStore {
            backend,
            status: Arc::new(RwLock::new(status)),
            fallback: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Current backing store status
    pub async fn status(&self) -> StoreStatus {
        *self.status.read().await
    }

    /// Re-probe the configured backend and update status accordingly
    pub async fn reconnect(&self) -> StoreStatus {
        if let Some(pool) = &self.backend {
            let next = match pool.health_check().await {
                Ok(true) => StoreStatus::Available,
                Ok(false) | Err(_) => StoreStatus::Degraded,
            };
            let mut status = self.status.write().await;
            if *status != next {
                info!("Revocation backend status changed to {:?}", next);
                *status = next;
            }
            next
        } else {
            StoreStatus::Available
        }
    }

    /// Revoke a token until its natural expiry
    ///
    /// The TTL comes from the token's own exp claim; an unreadable claim
    /// falls back to the default window. Revoking an already-revoked token
    /// is a no-op, and backend failures degrade to the in-process map so a
    /// logout on this instance always takes effect locally.
    pub async fn revoke(&self, token: &str) {
        let ttl = jwt::remaining_lifetime(token).unwrap_or(self.default_ttl);
        if ttl == 0 {
            // Already past its own expiry, nothing to record.
            return;
        }

        let digest = token_digest(token);

        if let Some(pool) = &self.backend {
            let key = format!("{}:{}", REVOKED_KEY_PREFIX, digest);
            match pool.set(&key, "1", Some(ttl)).await {
                Ok(()) => {
                    self.mark_available().await;
                    return;
                }
                Err(e) => {
                    warn!("Failed to write revocation entry to backend: {}", e);
                    self.mark_degraded().await;
                }
            }
        }

        let mut fallback = self.fallback.lock().await;
        fallback.insert(digest, jwt::now_secs() + ttl);
    }

    /// Check whether a token has been revoked
    ///
    /// Fails open: a backend error is logged and treated as "not revoked"
    /// (after consulting the in-process map) rather than rejecting the
    /// request.
    pub async fn is_revoked(&self, token: &str) -> bool {
        let digest = token_digest(token);

        if let Some(pool) = &self.backend {
            let key = format!("{}:{}", REVOKED_KEY_PREFIX, digest);
            match pool.get(&key).await {
                Ok(Some(_)) => return true,
                Ok(None) => {
                    self.mark_available().await;
                    // Fall through: entries recorded while degraded live in
                    // the in-process map only.
                }
                Err(e) => {
                    warn!(
                        "Revocation lookup failed, failing open for this token: {}",
                        e
                    );
                    self.mark_degraded().await;
                }
            }
        }

        let fallback = self.fallback.lock().await;
        match fallback.get(&digest) {
            Some(expiry) => *expiry > jwt::now_secs(),
            None => false,
        }
    }

    /// Remove expired entries from the in-process map
    pub async fn sweep(&self) {
        let now = jwt::now_secs();
        let mut fallback = self.fallback.lock().await;
        fallback.retain(|_, expiry| *expiry > now);
    }

    /// Spawn the periodic sweeper for the in-process map
    ///
    /// Expired-but-unswept entries only cost memory, never correctness,
    /// because lookups check expiry at read time.
    pub fn spawn_sweeper(&self, interval_secs: u64) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                store.sweep().await;
            }
        });
    }

    async fn mark_available(&self) {
        let mut status = self.status.write().await;
        if *status != StoreStatus::Available {
            info!("Revocation backend recovered");
            *status = StoreStatus::Available;
        }
    }

    async fn mark_degraded(&self) {
        let mut status = self.status.write().await;
        if *status != StoreStatus::Degraded {
            *status = StoreStatus::Degraded;
        }
    }
}

/// SHA-256 digest of the raw token string
fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{ExpiryProfile, JwtConfig, JwtService, TokenType};
    use uuid::Uuid;

    fn jwt_service() -> JwtService {
        JwtService::new(JwtConfig {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            extended_access_token_expiry: 604_800,
            extended_refresh_token_expiry: 2_592_000,
        })
    }

    #[tokio::test]
    async fn test_revoke_then_lookup() {
        let store = RevocationStore::new(None, 900).await;
        let token = jwt_service()
            .mint(
                Uuid::new_v4(),
                TokenType::Access,
                ExpiryProfile::Standard,
                None,
            )
            .unwrap();

        assert!(!store.is_revoked(&token).await);
        store.revoke(&token).await;
        assert!(store.is_revoked(&token).await);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = RevocationStore::new(None, 900).await;
        let token = jwt_service()
            .mint(
                Uuid::new_v4(),
                TokenType::Access,
                ExpiryProfile::Standard,
                None,
            )
            .unwrap();

        store.revoke(&token).await;
        store.revoke(&token).await;
        assert!(store.is_revoked(&token).await);

        let fallback = store.fallback.lock().await;
        assert_eq!(fallback.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_token_uses_default_ttl() {
        let store = RevocationStore::new(None, 900).await;

        store.revoke("not-a-jwt-at-all").await;
        assert!(store.is_revoked("not-a-jwt-at-all").await);

        let fallback = store.fallback.lock().await;
        let expiry = *fallback.values().next().unwrap();
        let remaining = expiry.saturating_sub(jwt::now_secs());
        assert!(remaining > 890 && remaining <= 900);
    }

    #[tokio::test]
    async fn test_entry_dies_with_its_token() {
        let store = RevocationStore::new(None, 900).await;
        let digest = token_digest("some-token");

        // An entry whose expiry has already elapsed is never reported as
        // revoked, swept or not.
        store
            .fallback
            .lock()
            .await
            .insert(digest.clone(), jwt::now_secs() - 10);
        assert!(!store.is_revoked("some-token").await);

        store.sweep().await;
        assert!(store.fallback.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_process_mode_is_available() {
        let store = RevocationStore::new(None, 900).await;
        assert_eq!(store.status().await, StoreStatus::Available);
        assert_eq!(store.reconnect().await, StoreStatus::Available);
    }

    #[tokio::test]
    async fn test_raw_token_never_stored() {
        let store = RevocationStore::new(None, 900).await;
        let token = "header.payload.signature";

        store.revoke(token).await;
        let fallback = store.fallback.lock().await;
        assert!(!fallback.contains_key(token));
        assert!(fallback.contains_key(&token_digest(token)));
    }
}
