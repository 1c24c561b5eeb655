//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP transport and
//! secure storage) into the session client core. Desktop apps typically enable
//! the `desktop-shims` feature (which depends on `bridge-desktop`) and let the
//! service pick a `reqwest` transport when none is configured.
//!
//! ```ignore
//! use core_runtime::config::ClientConfig;
//! use core_service::CoreService;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://api.example.com")
//!     .from_env()?
//!     .build()?;
//! let core = CoreService::start(config).await?;
//! let outcome = core.sessions().login("alice", "secret").await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_auth::{ApiClient, AuthSnapshot, SessionManager, SubscriptionId};
use core_runtime::config::ClientConfig;
use core_runtime::events::{CoreEvent, EventBus};
use tokio::sync::broadcast::Receiver;
use tracing::info;

/// Primary façade exposed to host applications.
///
/// Owns one [`ApiClient`] and one [`SessionManager`] sharing a single
/// credential store and event bus.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<ClientConfig>,
    event_bus: EventBus,
    client: ApiClient,
    sessions: SessionManager,
}

impl CoreService {
    /// Wires the service from a validated configuration.
    ///
    /// Uses the configured HTTP client, or the desktop default when the
    /// `desktop-shims` feature is enabled.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = resolve_http_client(&config)?;
        let event_bus = EventBus::default();
        let client = ApiClient::new(&config, http_client, event_bus.clone());
        let sessions = SessionManager::new(client.clone());

        info!(
            base_url = %config.base_url,
            app = %config.app.name,
            "Core service created"
        );

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            client,
            sessions,
        })
    }

    /// Creates the service and restores any persisted session.
    pub async fn start(config: ClientConfig) -> Result<Self> {
        let service = Self::new(config)?;
        let snapshot = service.sessions.initialize().await;
        info!(
            authenticated = snapshot.is_authenticated,
            guest = snapshot.is_guest(),
            "Core service started"
        );
        Ok(service)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The authenticated HTTP client for application endpoints.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Login, logout, guest mode and session listing.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.sessions.snapshot()
    }

    /// Observes auth state changes.
    pub fn subscribe(
        &self,
        observer: impl Fn(&AuthSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.sessions.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.sessions.unsubscribe(id)
    }

    /// Receives every auth and session event published by the core.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

fn resolve_http_client(config: &ClientConfig) -> Result<Arc<dyn HttpClient>> {
    if let Some(client) = &config.http_client {
        return Ok(Arc::clone(client));
    }

    #[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
    {
        let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.timeout)
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        Ok(Arc::new(client))
    }

    #[cfg(not(all(feature = "desktop-shims", not(target_arch = "wasm32"))))]
    {
        Err(CoreError::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "No HTTP client configured. Enable `desktop-shims` or call \
                      `ClientConfigBuilder::http_client`."
                .to_string(),
        })
    }
}
