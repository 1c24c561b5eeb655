//! # Single-flight Token Refresh
//!
//! At most one refresh call is in flight at any time. The first caller that
//! needs a new access token starts a refresh cycle; every caller that arrives
//! while it is pending joins the same cycle and observes the same outcome.
//!
//! ## How it works
//!
//! The pending refresh is a [`Shared`] future parked in a guarded slot. The
//! slot's lock is only held long enough to clone or install the future, never
//! across an await. The future clears the slot itself when it settles, so the
//! next caller after that starts a fresh cycle.
//!
//! ```text
//!  request A ──401──┐
//!  request B ──401──┼──> acquire_or_join ──> [cycle 3: POST /refresh] ──> A2
//!  request C ──401──┘            (B and C join cycle 3)
//! ```
//!
//! Dropping a joiner is safe: the shared future keeps running as long as any
//! clone is still polled, and a later joiner re-polls it if everyone left.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::token_store::TokenStore;
use crate::types::{ApiEnvelope, RefreshData, RefreshTokenRequest};

/// Why a refresh cycle produced no token.
///
/// Cloneable because every joiner of a cycle receives its own copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The server refused the refresh token.
    #[error("Refresh rejected: {0}")]
    Rejected(String),

    /// The refresh call never produced an answer.
    #[error("Refresh request failed: {0}")]
    Transport(String),

    /// A login or logout replaced the session while the call was pending.
    #[error("Session changed during refresh")]
    Superseded,
}

/// New access token, or why there is none.
pub type RefreshOutcome = std::result::Result<String, RefreshFailure>;

/// Result of [`RefreshCoordinator::acquire_or_join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    /// Cycle the caller started or joined. Joiners of one cycle share it.
    pub cycle: u64,
    /// Session generation the cycle started in.
    pub generation: u64,
    pub outcome: RefreshOutcome,
}

impl RefreshTicket {
    pub fn token(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

/// Performs the actual refresh network call.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<RefreshData, RefreshFailure>;
}

/// [`TokenRefresher`] that posts the refresh token straight to the bridge
/// transport.
///
/// It deliberately bypasses `ApiClient` so a 401 from the refresh endpoint
/// cannot recurse into another refresh.
pub struct HttpTokenRefresher {
    http_client: Arc<dyn HttpClient>,
    url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    pub fn new(http_client: Arc<dyn HttpClient>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<RefreshData, RefreshFailure> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let request = HttpRequest::new(HttpMethod::Post, &self.url)
            .header("Accept", "application/json")
            .json(&body)
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| RefreshFailure::Transport(ApiError::from_bridge(e).to_string()))?;

        if !response.is_success() {
            let error = ApiError::from_response(&response);
            return Err(if response.is_server_error() {
                RefreshFailure::Transport(error.to_string())
            } else {
                RefreshFailure::Rejected(error.to_string())
            });
        }

        let envelope: ApiEnvelope<RefreshData> = response
            .json()
            .map_err(|e| RefreshFailure::Transport(format!("Invalid refresh response: {}", e)))?;

        envelope
            .into_data()
            .map_err(|e| RefreshFailure::Rejected(e.to_string()))
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    cycle: u64,
    generation: u64,
    future: SharedRefresh,
}

struct Slot {
    in_flight: Mutex<Option<InFlight>>,
}

impl Slot {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, cycle: u64) {
        let mut guard = self.lock();
        if guard.as_ref().map(|f| f.cycle) == Some(cycle) {
            *guard = None;
        }
    }
}

/// Coordinates refreshes so that exactly one network call happens per cycle.
///
/// Cloning is cheap; clones share the slot and the cycle counter.
#[derive(Clone)]
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    tokens: TokenStore,
    event_bus: EventBus,
    slot: Arc<Slot>,
    cycles: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>, tokens: TokenStore, event_bus: EventBus) -> Self {
        Self {
            refresher,
            tokens,
            event_bus,
            slot: Arc::new(Slot {
                in_flight: Mutex::new(None),
            }),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a refresh is currently pending.
    pub fn is_refreshing(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Number of refresh cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Starts a refresh cycle, or joins the one already pending.
    pub async fn acquire_or_join(&self) -> RefreshTicket {
        let (cycle, generation, future) = {
            let mut guard = self.slot.lock();
            match guard.as_ref() {
                Some(in_flight) => {
                    debug!(cycle = in_flight.cycle, "Joining pending token refresh");
                    (in_flight.cycle, in_flight.generation, in_flight.future.clone())
                }
                None => {
                    let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
                    let generation = self.tokens.generation();
                    let future = self.start_cycle(cycle, generation);
                    *guard = Some(InFlight {
                        cycle,
                        generation,
                        future: future.clone(),
                    });
                    (cycle, generation, future)
                }
            }
        };

        RefreshTicket {
            cycle,
            generation,
            outcome: future.await,
        }
    }

    fn start_cycle(&self, cycle: u64, generation: u64) -> SharedRefresh {
        let refresher = Arc::clone(&self.refresher);
        let tokens = self.tokens.clone();
        let event_bus = self.event_bus.clone();
        // Weak so a parked future does not keep the coordinator alive.
        let slot: Weak<Slot> = Arc::downgrade(&self.slot);

        async move {
            let outcome =
                run_refresh(cycle, generation, refresher.as_ref(), &tokens, &event_bus).await;
            if let Some(slot) = slot.upgrade() {
                slot.release(cycle);
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn run_refresh(
    cycle: u64,
    generation: u64,
    refresher: &dyn TokenRefresher,
    tokens: &TokenStore,
    event_bus: &EventBus,
) -> RefreshOutcome {
    let Some(refresh_token) = tokens.refresh_token().await else {
        warn!(cycle, "No refresh token stored, cannot refresh");
        return Err(RefreshFailure::MissingRefreshToken);
    };

    info!(cycle, "Refreshing access token");
    let _ = event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

    match refresher.refresh(&refresh_token).await {
        Ok(data) => {
            if !tokens.store_refreshed(generation, &data).await {
                info!(cycle, generation, "Session changed during refresh, discarding new tokens");
                return Err(RefreshFailure::Superseded);
            }

            info!(cycle, rotated = data.refresh_token.is_some(), "Access token refreshed");
            let _ = event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed));
            Ok(data.access_token)
        }
        Err(failure) => {
            warn!(cycle, error = %failure, "Token refresh failed");
            let _ = event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                message: failure.to_string(),
                recoverable: false,
            }));
            Err(failure)
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("cycles_started", &self.cycles_started())
            .field("is_refreshing", &self.is_refreshing())
            .finish()
    }
}
