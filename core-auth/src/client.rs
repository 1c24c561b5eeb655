//! # HTTP Client Core
//!
//! [`ApiClient`] is the one client every feature goes through. It turns paths
//! into absolute URLs, attaches the stored bearer token, decodes JSON, and
//! recovers from expired access tokens.
//!
//! ## Refresh handling
//!
//! - Before sending, a missing access token triggers (or joins) a refresh.
//! - A 401 triggers (or joins) a refresh and the request is re-sent once with
//!   the new token. A second 401 is final.
//! - When a refresh cycle yields no token, stored credentials are cleared and
//!   the auth-failure handlers run once for that cycle. A cycle whose session
//!   was replaced by a login or logout in the meantime clears nothing.
//!
//! Requests built with [`RequestOptions::skip_auth`] (login, refresh, logout)
//! never carry the stored bearer and never enter refresh handling.
//!
//! Every error that leaves the client is first passed to the global-error
//! handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::{join_url, ApiEndpoints, AppInfo, ClientConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshFailure, TokenRefresher};
use crate::token_store::TokenStore;
use crate::types::ApiEnvelope;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Called after credentials were torn down because refresh failed.
pub type AuthFailureHandler = Arc<dyn Fn() + Send + Sync>;

/// Called with every error the client surfaces.
pub type GlobalErrorHandler = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Per-request behavior switches.
///
/// `skip_auth` also governs refresh handling when an explicit bearer is set
/// with [`ApiRequest::bearer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Send without the stored bearer and bypass refresh handling.
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn skip_auth() -> Self {
        Self { skip_auth: true }
    }
}

/// A request relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Bytes>,
    pub options: RequestOptions,
    /// Bearer to send instead of the stored one.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::Transport(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn skip_auth(self) -> Self {
        self.options(RequestOptions::skip_auth())
    }

    /// Sends `token` as the bearer. The store is not consulted.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

struct ClientInner {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
    endpoints: ApiEndpoints,
    app: AppInfo,
    tokens: TokenStore,
    refresh: RefreshCoordinator,
    event_bus: EventBus,
    auth_failure_handlers: RwLock<Vec<AuthFailureHandler>>,
    global_error_handlers: RwLock<Vec<GlobalErrorHandler>>,
    /// Highest refresh cycle whose failure already tore down credentials.
    torn_down_cycle: AtomicU64,
}

/// Shared HTTP client with bearer injection and refresh-on-401.
///
/// Cloning is cheap; all clones share tokens, handlers, and the refresh
/// coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Builds a client whose refreshes go to the configured refresh endpoint.
    pub fn new(config: &ClientConfig, http_client: Arc<dyn HttpClient>, event_bus: EventBus) -> Self {
        let refresher = Arc::new(HttpTokenRefresher::new(
            Arc::clone(&http_client),
            config.url_for(&config.endpoints.refresh),
            config.timeout,
        ));
        Self::with_refresher(config, http_client, refresher, event_bus)
    }

    pub fn with_refresher(
        config: &ClientConfig,
        http_client: Arc<dyn HttpClient>,
        refresher: Arc<dyn TokenRefresher>,
        event_bus: EventBus,
    ) -> Self {
        let tokens = TokenStore::new(
            Arc::clone(&config.secure_store),
            config.storage_keys.clone(),
        );
        let refresh = RefreshCoordinator::new(refresher, tokens.clone(), event_bus.clone());

        info!(base_url = %config.base_url, timeout_ms = config.timeout.as_millis() as u64, "Initializing ApiClient");

        Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: config.base_url.clone(),
                timeout: config.timeout,
                endpoints: config.endpoints.clone(),
                app: config.app.clone(),
                tokens,
                refresh,
                event_bus,
                auth_failure_handlers: RwLock::new(Vec::new()),
                global_error_handlers: RwLock::new(Vec::new()),
                torn_down_cycle: AtomicU64::new(0),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.inner.endpoints
    }

    pub fn app(&self) -> &AppInfo {
        &self.inner.app
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Registers a callback for credential teardown after a failed refresh.
    pub fn on_auth_failure(&self, handler: impl Fn() + Send + Sync + 'static) {
        write_lock(&self.inner.auth_failure_handlers).push(Arc::new(handler));
    }

    /// Registers a callback invoked with every surfaced error.
    pub fn on_global_error(&self, handler: impl Fn(&ApiError) + Send + Sync + 'static) {
        write_lock(&self.inner.global_error_handlers).push(Arc::new(handler));
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<ApiEnvelope<T>> {
        self.call(ApiRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<ApiEnvelope<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ApiResult<ApiEnvelope<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<ApiEnvelope<T>> {
        self.call(ApiRequest::delete(path)).await
    }

    /// Sends a request and decodes the 2xx body as `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let response = self.send(request).await?;
        response
            .json()
            .map_err(|e| self.surface(ApiError::Decode(e.to_string())))
    }

    /// Sends a request through bearer injection and refresh handling.
    ///
    /// Returns the response only for 2xx statuses.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<HttpResponse> {
        let bearer = if request.bearer.is_some() {
            request.bearer.clone()
        } else if request.options.skip_auth {
            None
        } else {
            self.bearer_for_send().await
        };

        let response = self
            .execute(&request, bearer.as_deref())
            .await
            .map_err(|e| self.surface(e))?;

        if response.is_success() {
            return Ok(response);
        }

        if !response.is_unauthorized() || request.options.skip_auth {
            return Err(self.surface(ApiError::from_response(&response)));
        }

        debug!(path = %request.path, "Received 401, refreshing access token");
        let ticket = self.inner.refresh.acquire_or_join().await;
        match ticket.outcome {
            Ok(token) => {
                let retried = self
                    .execute(&request, Some(&token))
                    .await
                    .map_err(|e| self.surface(e))?;
                if retried.is_success() {
                    Ok(retried)
                } else {
                    debug!(path = %request.path, status = retried.status, "Retried request failed");
                    Err(self.surface(ApiError::from_response(&retried)))
                }
            }
            Err(failure) => {
                self.tear_down(ticket.cycle, ticket.generation, &failure).await;
                Err(self.surface(ApiError::from_response(&response)))
            }
        }
    }

    /// Forces a refresh (or joins the pending one).
    ///
    /// Returns the new access token. A failed cycle tears down credentials
    /// exactly as a failed 401 recovery would.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let ticket = self.inner.refresh.acquire_or_join().await;
        match ticket.outcome {
            Ok(token) => Some(token),
            Err(failure) => {
                self.tear_down(ticket.cycle, ticket.generation, &failure).await;
                None
            }
        }
    }

    async fn bearer_for_send(&self) -> Option<String> {
        if let Some(token) = self.inner.tokens.access_token().await {
            return Some(token);
        }
        let ticket = self.inner.refresh.acquire_or_join().await;
        if let Err(failure) = &ticket.outcome {
            debug!(error = %failure, "No access token available, sending unauthenticated");
        }
        ticket.outcome.ok()
    }

    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResult<HttpResponse> {
        let url = if request.path.starts_with("http://") || request.path.starts_with("https://") {
            request.path.clone()
        } else {
            join_url(&self.inner.base_url, &request.path)
        };

        let mut http_request = HttpRequest::new(request.method, url)
            .header("Accept", "application/json")
            .timeout(self.inner.timeout);
        if let Some(body) = &request.body {
            http_request = http_request
                .header("Content-Type", "application/json")
                .body(body.clone());
        }
        if let Some(token) = bearer {
            http_request = http_request.bearer_token(token);
        }

        let response = self
            .inner
            .http_client
            .execute(http_request)
            .await
            .map_err(ApiError::from_bridge)?;

        debug!(
            method = request.method.as_str(),
            path = %request.path,
            status = response.status,
            authenticated = bearer.is_some(),
            "HTTP request completed"
        );
        Ok(response)
    }

    /// Clears credentials after a failed cycle, unless that cycle was already
    /// handled or the session it belonged to has since been replaced.
    async fn tear_down(&self, cycle: u64, generation: u64, failure: &RefreshFailure) {
        if self.inner.torn_down_cycle.fetch_max(cycle, Ordering::SeqCst) >= cycle {
            return;
        }
        if !self.inner.tokens.clear_if_current(generation).await {
            debug!(cycle, generation, error = %failure, "Session changed since refresh started, keeping credentials");
            return;
        }

        warn!(cycle, error = %failure, "Token refresh failed, cleared credentials");
        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionExpired));

        let handlers = read_lock(&self.inner.auth_failure_handlers).clone();
        for handler in handlers {
            handler();
        }
    }

    fn surface(&self, error: ApiError) -> ApiError {
        let handlers = read_lock(&self.inner.global_error_handlers).clone();
        for handler in handlers {
            handler(&error);
        }
        error
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("refresh", &self.inner.refresh)
            .finish_non_exhaustive()
    }
}

fn read_lock<T: Clone>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockReadGuard<'_, Vec<T>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockWriteGuard<'_, Vec<T>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::MemorySecureStore;
    use bridge_traits::BridgeError;
    use mockall::mock;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use crate::token_store::TokenKind;
    use crate::types::RefreshData;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    mock! {
        Refresher {}

        #[async_trait]
        impl TokenRefresher for Refresher {
            async fn refresh(&self, refresh_token: &str) -> std::result::Result<RefreshData, RefreshFailure>;
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .base_url("http://api.test/")
            .secure_store(Arc::new(MemorySecureStore::new()))
            .build()
            .unwrap()
    }

    fn client(http: MockHttp, refresher: MockRefresher) -> ApiClient {
        ApiClient::with_refresher(
            &config(),
            Arc::new(http),
            Arc::new(refresher),
            EventBus::default(),
        )
    }

    fn ok_json(body: &str) -> HttpResponse {
        HttpResponse::new(200, body.to_string())
    }

    #[tokio::test]
    async fn test_attaches_stored_bearer() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| {
                r.url == "http://api.test/me"
                    && r.bearer() == Some("A1")
                    && r.headers.get("Accept").map(String::as_str) == Some("application/json")
            })
            .times(1)
            .returning(|_| Ok(ok_json(r#"{"success":true,"message":"","data":5}"#)));

        let client = client(http, MockRefresher::new());
        client.tokens().set(TokenKind::Access, "A1").await;

        let envelope: ApiEnvelope<i64> = client.get("/me").await.unwrap();
        assert_eq!(envelope.data, Some(5));
    }

    #[tokio::test]
    async fn test_skip_auth_sends_without_bearer_and_does_not_refresh() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| r.bearer().is_none() && r.body.is_some())
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, r#"{"message":"Invalid credentials"}"#)));

        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().never();

        let client = client(http, refresher);
        client.tokens().set(TokenKind::Access, "A1").await;
        client.tokens().set(TokenKind::Refresh, "R1").await;

        let request = ApiRequest::post("/login")
            .json(&serde_json::json!({ "username": "alice", "password": "bad" }))
            .unwrap()
            .skip_auth();
        let err = client.send(request).await.unwrap_err();

        assert_eq!(
            err,
            ApiError::Unauthorized {
                message: "Invalid credentials".to_string()
            }
        );
        // Credentials are untouched.
        assert_eq!(client.tokens().access_token().await.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_missing_access_token_refreshes_before_sending() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| r.bearer() == Some("A2"))
            .times(1)
            .returning(|_| Ok(ok_json(r#"{"success":true,"message":"","data":null}"#)));

        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().times(1).returning(|_| {
            Ok(RefreshData {
                access_token: "A2".to_string(),
                refresh_token: None,
                token_type: None,
                expires_in: None,
                user: None,
            })
        });

        let client = client(http, refresher);
        client.tokens().set(TokenKind::Refresh, "R1").await;

        let envelope: ApiEnvelope<serde_json::Value> = client.get("/me").await.unwrap();
        assert!(envelope.success);
    }

    #[tokio::test]
    async fn test_no_tokens_sends_unauthenticated() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| r.bearer().is_none())
            .times(1)
            .returning(|_| Ok(ok_json(r#"{"success":true,"message":"public","data":1}"#)));

        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().never();

        let client = client(http, refresher);
        let envelope: ApiEnvelope<i64> = client.get("/status").await.unwrap();
        assert_eq!(envelope.message, "public");
    }

    #[tokio::test]
    async fn test_server_errors_reach_global_handlers_without_retry() {
        let mut http = MockHttp::new();
        let mut responses = vec![
            Ok(HttpResponse::new(500, r#"{"message":"Database unavailable"}"#)),
            Err(BridgeError::Timeout(Duration::from_secs(10))),
        ]
        .into_iter();
        http.expect_execute()
            .times(2)
            .returning(move |_| responses.next().unwrap());

        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().never();

        let client = client(http, refresher);
        client.tokens().set(TokenKind::Access, "A1").await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_global_error(move |e| sink.lock().unwrap().push(e.clone()));

        let first = client.get::<()>("/sessions").await.unwrap_err();
        assert_eq!(first.status(), Some(500));
        assert_eq!(first.to_envelope::<()>().message, "Database unavailable");

        let second = client.get::<()>("/sessions").await.unwrap_err();
        assert_eq!(second, ApiError::Timeout(Duration::from_secs(10)));

        assert_eq!(seen.lock().unwrap().as_slice(), &[first, second]);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(ok_json("<html>maintenance</html>")));

        let client = client(http, MockRefresher::new());
        client.tokens().set(TokenKind::Access, "A1").await;

        let err = client.get::<()>("/me").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_tears_down_once() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, r#"{"detail":"Token expired"}"#)));

        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(|_| Err(RefreshFailure::Rejected("expired".to_string())));

        let client = client(http, refresher);
        client.tokens().set(TokenKind::Access, "A1").await;
        client.tokens().set(TokenKind::Refresh, "R1").await;

        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        client.on_auth_failure(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = client.get::<()>("/me").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(client.tokens().access_token().await.is_none());
        assert!(client.tokens().refresh_token().await.is_none());
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::delete("/sessions/3").skip_auth().bearer("A1");
        assert_eq!(request.method, HttpMethod::Delete);
        assert!(request.options.skip_auth);
        assert_eq!(request.bearer.as_deref(), Some("A1"));
        assert!(request.body.is_none());
        assert_eq!(RequestOptions::default(), RequestOptions { skip_auth: false });
    }
}
