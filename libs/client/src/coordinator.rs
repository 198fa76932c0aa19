//! Refresh coordinator: single-flight token refresh with a wait queue
//!
//! At most one refresh call is in flight process-wide. The first caller to
//! observe an expired access token becomes the leader and performs the
//! exchange; everyone else parks on a oneshot receiver and resumes with the
//! leader's result. A failed refresh clears the stored credentials and
//! flips the session-expired signal, so the application never sits in an
//! authenticated-but-broken state.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, oneshot, watch};
use tracing::{debug, info, warn};

use crate::transport::{RefreshError, TokenPair, TokenRefresher};

/// Coordinator state machine
enum RefreshState {
    /// No refresh in flight
    Idle,
    /// A refresh is in flight; queued callers park here
    Refreshing {
        waiters: Vec<oneshot::Sender<Result<String, RefreshError>>>,
    },
}

/// Stored credentials plus the remember-me flag they were issued under
#[derive(Clone)]
struct StoredSession {
    tokens: TokenPair,
    remember: bool,
}

struct Inner<R> {
    refresher: R,
    session: RwLock<Option<StoredSession>>,
    state: Mutex<RefreshState>,
    session_expired: watch::Sender<bool>,
}

/// Deduplicates concurrent refresh attempts into a single in-flight call
pub struct RefreshCoordinator<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for RefreshCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TokenRefresher> RefreshCoordinator<R> {
    /// Create a new coordinator around a refresh transport
    pub fn new(refresher: R) -> Self {
        let (session_expired, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                refresher,
                session: RwLock::new(None),
                state: Mutex::new(RefreshState::Idle),
                session_expired,
            }),
        }
    }

    /// Store a freshly issued token pair (login or manual refresh)
    pub async fn set_session(&self, tokens: TokenPair, remember: bool) {
        *self.inner.session.write().await = Some(StoredSession { tokens, remember });
        self.inner.session_expired.send_replace(false);
    }

    /// Drop stored credentials (logout)
    pub async fn clear_session(&self) {
        *self.inner.session.write().await = None;
    }

    /// The current access token, if a session is stored
    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
    }

    /// Signal that flips to `true` when a refresh fails terminally
    ///
    /// The frontend surfaces its session-expired notification off this.
    pub fn session_expired(&self) -> watch::Receiver<bool> {
        self.inner.session_expired.subscribe()
    }

    /// Obtain a fresh access token, joining any refresh already in flight
    ///
    /// Exactly one underlying refresh call happens no matter how many tasks
    /// arrive here concurrently. Queued waiters settle only when that call
    /// settles; there are no waiter timeouts.
    pub async fn refresh_access_token(&self) -> Result<String, RefreshError> {
        // Either become the leader or park in the queue.
        let parked = {
            let mut state = self.inner.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    debug!("Joining in-flight refresh ({} queued)", waiters.len());
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = parked {
            return rx
                .await
                .unwrap_or(Err(RefreshError::Protocol("refresh flight dropped".into())));
        }

        // Leader path: exactly one refresh call.
        let stored = self.inner.session.read().await.clone();
        let result = match stored {
            None => Err(RefreshError::SessionExpired),
            Some(session) => {
                self.inner
                    .refresher
                    .refresh(&session.tokens.refresh_token, session.remember)
                    .await
                    .map(|tokens| (tokens, session.remember))
            }
        };

        let shared: Result<String, RefreshError> = match &result {
            Ok((tokens, remember)) => {
                *self.inner.session.write().await = Some(StoredSession {
                    tokens: tokens.clone(),
                    remember: *remember,
                });
                info!("Access token refreshed");
                Ok(tokens.access_token.clone())
            }
            Err(e) => {
                // Terminal: force a full logout rather than leaving the
                // client ambiguous about its session.
                warn!("Refresh failed, clearing session: {}", e);
                *self.inner.session.write().await = None;
                self.inner.session_expired.send_replace(true);
                Err(e.clone())
            }
        };

        let waiters = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };

        for waiter in waiters {
            // A dropped waiter (caller went away) is fine.
            let _ = waiter.send(shared.clone());
        }

        shared
    }
}
