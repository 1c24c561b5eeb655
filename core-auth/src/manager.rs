//! # Session Manager
//!
//! High-level session lifecycle: login, guest mode, logout, startup
//! hydration, and access to the current user's profile and sessions.
//!
//! ## Overview
//!
//! `SessionManager` owns the observable [`AuthSessionState`] and drives it
//! from the outcome of each operation. It emits [`AuthEvent`]s on the event
//! bus and keeps the query cache consistent with who is signed in.
//!
//! ## Guarantees
//!
//! - Login failures are values ([`LoginOutcome`]), never errors, and never
//!   touch stored credentials.
//! - Logout always clears local state first. The server call afterwards is
//!   best-effort.
//! - Startup never lands half-authenticated: either a token and a usable
//!   profile are both present, or storage is wiped.
//! - A refresh failure anywhere in the client drops the state to anonymous.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{ApiClient, SessionManager};
//!
//! let manager = SessionManager::new(client);
//! manager.subscribe(|snapshot| println!("authenticated: {}", snapshot.is_authenticated));
//!
//! manager.initialize().await;
//! let outcome = manager.login("alice", "secret").await;
//! if outcome.success {
//!     let sessions = manager.sessions()?.list().await?;
//! }
//! manager.logout().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::cache::{QueryCache, PROFILE_KEY};
use crate::client::{ApiClient, ApiRequest};
use crate::error::{AuthError, Result};
use crate::sessions::SessionsApi;
use crate::state::{AuthSessionState, AuthSnapshot, AuthState, SubscriptionId};
use crate::token_store::TokenStore;
use crate::types::{ApiEnvelope, LoginData, LoginRequest, RefreshTokenRequest, UserProfile};

/// How long a fetched profile is served from cache.
pub const PROFILE_STALE_TIME: Duration = Duration::from_secs(300);

const LOGIN_IN_PROGRESS: &str = "A login is already in progress";

/// Result of [`SessionManager::login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
    pub user: Option<UserProfile>,
}

impl LoginOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}

/// Result of [`SessionManager::logout`].
///
/// Local state is always cleared; this only reports whether the server
/// confirmed the logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutOutcome {
    pub server_acknowledged: bool,
}

/// Resets the login flag when a login finishes or is dropped mid-flight.
struct LoginGuard<'a>(&'a AtomicBool);

impl Drop for LoginGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ManagerInner {
    client: ApiClient,
    state: AuthSessionState,
    cache: QueryCache,
    event_bus: EventBus,
    login_in_flight: AtomicBool,
    initialized: OnceCell<()>,
}

/// Session lifecycle facade. Cloning is cheap.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(client: ApiClient) -> Self {
        Self::with_cache(client, QueryCache::default())
    }

    pub fn with_cache(client: ApiClient, cache: QueryCache) -> Self {
        let state = AuthSessionState::new();
        let event_bus = client.event_bus().clone();

        {
            let state = state.clone();
            let cache = cache.clone();
            client.on_auth_failure(move || {
                cache.clear();
                if !matches!(state.current(), AuthState::Guest(_)) {
                    state.set(AuthState::Anonymous);
                }
            });
        }

        Self {
            inner: Arc::new(ManagerInner {
                client,
                state,
                cache,
                event_bus,
                login_in_flight: AtomicBool::new(false),
                initialized: OnceCell::new(),
            }),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn state(&self) -> &AuthSessionState {
        &self.inner.state
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.snapshot()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    fn tokens(&self) -> &TokenStore {
        self.inner.client.tokens()
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.inner.event_bus.emit(CoreEvent::Auth(event));
    }

    pub fn subscribe(&self, observer: impl Fn(&AuthSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.state.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.state.unsubscribe(id)
    }

    /// Restores a persisted session. Only the first call does any work.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> AuthSnapshot {
        self.inner
            .initialized
            .get_or_init(|| self.hydrate())
            .await;
        self.snapshot()
    }

    async fn hydrate(&self) {
        let token = self.tokens().access_token().await;
        let user = self.tokens().user_profile().await;

        match (token, user) {
            (Some(_), Some(user)) if !user.is_guest => {
                info!(user_id = user.id, "Restored persisted session");
                self.inner.state.set(AuthState::Authenticated(user));
            }
            (token, user) => {
                debug!(
                    has_token = token.is_some(),
                    has_profile = user.is_some(),
                    "No usable persisted session, clearing storage"
                );
                self.tokens().clear().await;
                self.inner.state.set(AuthState::Anonymous);
            }
        }
    }

    /// Exchanges credentials for tokens.
    ///
    /// Expected failures (bad password, network down) come back as an
    /// unsuccessful [`LoginOutcome`] and move the state to `Error`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> LoginOutcome {
        if self.inner.login_in_flight.swap(true, Ordering::SeqCst) {
            warn!("Login already in progress");
            return LoginOutcome::failure(LOGIN_IN_PROGRESS);
        }
        let _guard = LoginGuard(&self.inner.login_in_flight);

        info!("Signing in");
        self.inner.state.set(AuthState::Loading);
        self.emit(AuthEvent::SigningIn {
            username: username.to_string(),
        });

        let app = self.inner.client.app();
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            device_name: app.device_name.clone(),
            user_agent: Some(app.user_agent()),
        };

        match self.request_login(&body).await {
            Ok((message, data)) => {
                let user = data.user.clone();
                self.tokens().store_session(&data.credentials(), &user).await;
                self.inner.cache.clear();
                self.inner.state.set(AuthState::Authenticated(user.clone()));
                self.emit(AuthEvent::SignedIn {
                    user_id: user.id,
                    username: user.username.clone(),
                });
                info!(user_id = user.id, "Signed in");

                LoginOutcome {
                    success: true,
                    message,
                    user: Some(user),
                }
            }
            Err(message) => {
                warn!(reason = %message, "Sign-in failed");
                self.inner.state.set(AuthState::Error(message.clone()));
                self.emit(AuthEvent::AuthError {
                    message: message.clone(),
                    recoverable: true,
                });
                LoginOutcome::failure(message)
            }
        }
    }

    async fn request_login(&self, body: &LoginRequest) -> std::result::Result<(String, LoginData), String> {
        let path = self.inner.client.endpoints().login.clone();
        let request = ApiRequest::post(path)
            .json(body)
            .map_err(|e| e.to_envelope::<()>().message)?
            .skip_auth();

        let envelope: ApiEnvelope<LoginData> = self
            .inner
            .client
            .call(request)
            .await
            .map_err(|e| e.to_envelope::<()>().message)?;

        let message = envelope.message.clone();
        let data = envelope.into_data().map_err(|e| e.to_string())?;
        Ok((message, data))
    }

    /// Continues without an account.
    ///
    /// Any stored credentials are wiped; the guest profile is never
    /// persisted.
    #[instrument(skip(self))]
    pub async fn guest(&self) -> UserProfile {
        let guest = UserProfile::guest();
        self.tokens().clear().await;
        self.inner.cache.clear();
        self.inner.state.set(AuthState::Guest(guest.clone()));
        self.emit(AuthEvent::GuestSignedIn);
        info!("Continuing as guest");
        guest
    }

    /// Signs out. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> LogoutOutcome {
        let (access_token, refresh_token) = self.clear_local().await;

        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token stored, skipping server logout");
            return LogoutOutcome {
                server_acknowledged: false,
            };
        };

        let path = self.inner.client.endpoints().logout.clone();
        let request = ApiRequest::post(path)
            .json(&RefreshTokenRequest { refresh_token })
            .map(|request| match access_token {
                Some(token) => request.skip_auth().bearer(token),
                None => request.skip_auth(),
            });

        let acknowledged = match request {
            Ok(request) => match self.inner.client.send(request).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Server logout failed, local session already cleared");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not build logout request");
                false
            }
        };

        LogoutOutcome {
            server_acknowledged: acknowledged,
        }
    }

    /// Revokes every session on the server, then signs out locally whatever
    /// the server said.
    #[instrument(skip(self))]
    pub async fn logout_everywhere(&self) -> LogoutOutcome {
        let acknowledged = match self.sessions() {
            Ok(sessions) => match sessions.revoke_all().await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Revoking all sessions failed");
                    false
                }
            },
            Err(e) => {
                debug!(error = %e, "Not signed in, only clearing local state");
                false
            }
        };

        self.clear_local().await;
        LogoutOutcome {
            server_acknowledged: acknowledged,
        }
    }

    /// Wipes tokens, profile and cache, then moves to `Anonymous`.
    /// Returns the tokens that were stored.
    async fn clear_local(&self) -> (Option<String>, Option<String>) {
        let access_token = self.tokens().access_token().await;
        let refresh_token = self.tokens().refresh_token().await;

        self.tokens().clear().await;
        self.inner.cache.clear();
        self.inner.state.set(AuthState::Anonymous);
        self.emit(AuthEvent::SignedOut);
        info!("Signed out locally");

        (access_token, refresh_token)
    }

    /// Fetches the current user from the server and stores it.
    #[instrument(skip(self))]
    pub async fn refresh_user(&self) -> Result<UserProfile> {
        self.require_account()?;

        let path = self.inner.client.endpoints().me.clone();
        let user = self
            .inner
            .client
            .get::<UserProfile>(&path)
            .await?
            .into_data()?;

        // A logout may have happened while the request was in flight.
        if !matches!(self.inner.state.current(), AuthState::Authenticated(_)) {
            return Err(AuthError::NotAuthenticated);
        }

        self.tokens().store_user(&user).await;
        self.inner
            .cache
            .insert(PROFILE_KEY, user.clone(), PROFILE_STALE_TIME);
        self.inner.state.set(AuthState::Authenticated(user.clone()));
        debug!(user_id = user.id, "Profile refreshed");
        Ok(user)
    }

    /// Current user's profile, from cache while fresh.
    pub async fn profile(&self) -> Result<UserProfile> {
        self.require_account()?;
        if let Some(user) = self.inner.cache.get::<UserProfile>(PROFILE_KEY) {
            return Ok(user);
        }
        self.refresh_user().await
    }

    /// Session management for the signed-in user.
    pub fn sessions(&self) -> Result<SessionsApi> {
        self.require_account()?;
        Ok(SessionsApi::new(
            self.inner.client.clone(),
            self.inner.cache.clone(),
            self.inner.event_bus.clone(),
        ))
    }

    fn require_account(&self) -> Result<()> {
        match self.inner.state.current() {
            AuthState::Authenticated(_) => Ok(()),
            AuthState::Guest(_) => Err(AuthError::GuestNotAllowed),
            _ => Err(AuthError::NotAuthenticated),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.inner.state)
            .field("initialized", &self.inner.initialized.initialized())
            .finish_non_exhaustive()
    }
}
