//! # Client Configuration Module
//!
//! Provides configuration management for the session client core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `ClientConfig` holding the API location, request timeout, endpoint paths,
//! storage key names, and the host bridges. Validation is fail-fast: an
//! unparseable base URL or an absurd timeout is rejected at `build()` rather
//! than surfacing as a confusing network error later.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - credential persistence
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP transport (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, a keychain-backed
//! `SecureStore` with in-memory fallback is injected if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ApiEndpoints, ClientConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://api.example.com")
//!     .timeout(Duration::from_secs(15))
//!     .endpoints(ApiEndpoints::with_prefix("/users"))
//!     .secure_store(store)
//!     .build()?;
//! ```
//!
//! ### From the environment
//!
//! ```ignore
//! let config = ClientConfig::builder().from_env()?.build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SecureStore};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_APP_NAME: &str = "session-core";

/// Names of the three secure-store entries that make up a local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub user_data: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "access_token".to_string(),
            refresh_token: "refresh_token".to_string(),
            user_data: "user_data".to_string(),
        }
    }
}

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub me: String,
    pub sessions: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

impl ApiEndpoints {
    /// Every path under a common prefix, e.g. `"/users"` yields `/users/login`.
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            login: format!("{}/login", prefix),
            refresh: format!("{}/refresh", prefix),
            logout: format!("{}/logout", prefix),
            me: format!("{}/me", prefix),
            sessions: format!("{}/sessions", prefix),
        }
    }

    /// Path of a single session resource.
    pub fn session(&self, session_id: i64) -> String {
        format!("{}/{}", self.sessions, session_id)
    }

    /// Path that revokes every session including the caller's.
    pub fn all_sessions(&self) -> String {
        format!("{}/all", self.sessions)
    }
}

/// Deployment environment, used for log defaults and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::Config(format!(
                "Unknown environment '{}'. Expected 'development' or 'production'.",
                other
            ))),
        }
    }
}

/// Application identity reported to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    /// Human-readable device label sent with logins for session listings
    pub device_name: Option<String>,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::default(),
            device_name: None,
        }
    }
}

impl AppInfo {
    /// Value for the `user_agent` field sent at login.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Configuration for the session client core.
///
/// Use [`ClientConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct ClientConfig {
    /// Scheme and host of the API, without a trailing slash
    pub base_url: String,

    /// Deadline applied to every request
    pub timeout: Duration,

    pub endpoints: ApiEndpoints,

    pub storage_keys: StorageKeys,

    pub app: AppInfo,

    /// HTTP transport (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Secure credential storage (required)
    pub secure_store: Arc<dyn SecureStore>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("endpoints", &self.endpoints)
            .field("storage_keys", &self.storage_keys)
            .field("app", &self.app)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("secure_store", &"SecureStore { ... }")
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Absolute URL for an endpoint path.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Base URL parses and uses http or https
    /// - Timeout is non-zero and at most five minutes
    /// - Storage keys are non-empty and distinct
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(Error::Config(format!(
                "Request timeout exceeds maximum of {} seconds",
                MAX_TIMEOUT.as_secs()
            )));
        }

        let keys = &self.storage_keys;
        if keys.access_token.is_empty() || keys.refresh_token.is_empty() || keys.user_data.is_empty()
        {
            return Err(Error::Config("Storage keys cannot be empty".to_string()));
        }

        if keys.access_token == keys.refresh_token
            || keys.access_token == keys.user_data
            || keys.refresh_token == keys.user_data
        {
            return Err(Error::Config(
                "Storage keys must be distinct from each other".to_string(),
            ));
        }

        Ok(())
    }
}

/// Joins a base URL and a path with exactly one slash between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the keychain-backed store. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store(app: &AppInfo) -> Result<Arc<dyn SecureStore>> {
    Ok(bridge_desktop::default_secure_store(&app.name))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store(_app: &AppInfo) -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

/// Builder for constructing [`ClientConfig`] instances.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    endpoints: Option<ApiEndpoints>,
    storage_keys: StorageKeys,
    app: AppInfo,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
}

impl ClientConfigBuilder {
    /// Sets the API base URL. Defaults to [`DEFAULT_BASE_URL`].
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-request deadline. Defaults to ten seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoints(mut self, endpoints: ApiEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.storage_keys = keys;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app.name = name.into();
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app.version = version.into();
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.app.environment = environment;
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.app.device_name = Some(name.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Applies values from process environment variables.
    ///
    /// Recognised variables: `API_BASE_URL`, `API_TIMEOUT` (milliseconds),
    /// `STORAGE_ACCESS_TOKEN`, `STORAGE_REFRESH_TOKEN`, `STORAGE_USER_DATA`,
    /// `APP_NAME`, `APP_VERSION`, `APP_ENV`, `DEVICE_NAME`. Unset variables
    /// leave the builder untouched.
    pub fn from_env(self) -> Result<Self> {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("API_BASE_URL") {
            self.base_url = Some(url);
        }

        if let Some(raw) = lookup("API_TIMEOUT") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "API_TIMEOUT must be a whole number of milliseconds, got '{}'",
                    raw
                ))
            })?;
            self.timeout = Some(Duration::from_millis(millis));
        }

        if let Some(key) = lookup("STORAGE_ACCESS_TOKEN") {
            self.storage_keys.access_token = key;
        }
        if let Some(key) = lookup("STORAGE_REFRESH_TOKEN") {
            self.storage_keys.refresh_token = key;
        }
        if let Some(key) = lookup("STORAGE_USER_DATA") {
            self.storage_keys.user_data = key;
        }

        if let Some(name) = lookup("APP_NAME") {
            self.app.name = name;
        }
        if let Some(version) = lookup("APP_VERSION") {
            self.app.version = version;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.app.environment = Environment::parse(&env)?;
        }
        if let Some(device) = lookup("DEVICE_NAME") {
            self.app.device_name = Some(device);
        }

        Ok(self)
    }

    /// Builds the final `ClientConfig` instance.
    ///
    /// Returns an error if no `SecureStore` is available or if any value
    /// fails [`ClientConfig::validate`].
    pub fn build(self) -> Result<ClientConfig> {
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store(&self.app)?,
        };

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let config = ClientConfig {
            base_url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            endpoints: self.endpoints.unwrap_or_default(),
            storage_keys: self.storage_keys,
            app: self.app,
            http_client: self.http_client,
            secure_store,
        };

        config.validate()?;

        Ok(config)
    }
}
