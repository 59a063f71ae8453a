use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::ApiError;

/// Bearer token currently accepted by the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    pub issued_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

// Keep tokens out of logs
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Token together with the generation it belongs to.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub token: Option<AccessToken>,
    pub generation: u64,
}

/// Result of a refresh, possibly shared with other waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Renewed(AccessToken),
    Failed,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<AccessToken>,
    generation: u64,
}

/// Owner of the current access token.
///
/// Shared as `Arc<Session>` between every client that talks to the same
/// backend. Every change to the token bumps the generation, so a request
/// that was sent under an older generation can tell a refresh already
/// happened and reuse its outcome.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<TokenState>,
    refresh_gate: Mutex<()>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(TokenState {
                token: Some(AccessToken::new(token)),
                generation: 1,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    pub async fn token(&self) -> Option<AccessToken> {
        self.state.read().await.token.clone()
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            token: state.token.clone(),
            generation: state.generation,
        }
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Replace the current token
    pub async fn set_token(&self, token: impl Into<String>) -> AccessToken {
        let token = AccessToken::new(token);
        let mut state = self.state.write().await;
        state.token = Some(token.clone());
        state.generation += 1;
        token
    }

    /// Drop the current token
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.token = None;
        state.generation += 1;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    /// Run `refresh` at most once for all callers that observed `seen_generation`.
    ///
    /// Callers queue on the refresh gate. The first one whose generation is
    /// still current runs `refresh` and stores or clears the token; the rest
    /// find the generation moved on and return whatever the session now
    /// holds. Dropping the future while `refresh` is pending leaves the
    /// session untouched and frees the gate for the next waiter.
    pub async fn refresh_coalesced<F, Fut>(&self, seen_generation: u64, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ApiError>>,
    {
        let _gate = self.refresh_gate.lock().await;

        let current = self.snapshot().await;
        if current.generation != seen_generation {
            debug!(
                seen = seen_generation,
                current = current.generation,
                "Token already changed, reusing outcome"
            );
            return match current.token {
                Some(token) => RefreshOutcome::Renewed(token),
                None => RefreshOutcome::Failed,
            };
        }

        match refresh().await {
            Ok(value) => {
                let token = self.set_token(value).await;
                info!("Access token refreshed");
                RefreshOutcome::Renewed(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.clear().await;
                RefreshOutcome::Failed
            }
        }
    }
}
