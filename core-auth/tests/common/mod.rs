//! Shared fixtures for core-auth integration tests.
//!
//! [`FakeApi`] is an in-process stand-in for the auth server. It issues
//! tokens in sequence (`A1`/`R1` at login, `A2`/`R2` on the first refresh,
//! and so on), validates bearers, and records every request it sees.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::MemorySecureStore;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::{ApiClient, SessionManager};
use core_runtime::config::ClientConfig;
use core_runtime::events::EventBus;
use serde_json::{json, Value};

pub const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct ServerState {
    issued: u32,
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    session_ids: Vec<i64>,
    reject_refresh: bool,
    reject_all_bearers: bool,
    offline: bool,
}

pub struct FakeApi {
    state: Mutex<ServerState>,
    requests: Mutex<Vec<RecordedRequest>>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Self::with_refresh_delay(Duration::from_millis(20))
    }

    pub fn with_refresh_delay(refresh_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                session_ids: vec![1, 2, 3],
                ..ServerState::default()
            }),
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay,
        })
    }

    /// Every access token issued so far stops being accepted.
    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().valid_access.clear();
    }

    pub fn reject_refresh(&self, reject: bool) {
        self.state.lock().unwrap().reject_refresh = reject;
    }

    /// Answer 401 to every bearer, fresh ones included.
    pub fn reject_all_bearers(&self, reject: bool) {
        self.state.lock().unwrap().reject_all_bearers = reject;
    }

    /// Fail every request at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    fn issue_pair(state: &mut ServerState) -> (String, String) {
        state.issued += 1;
        let access = format!("A{}", state.issued);
        let refresh = format!("R{}", state.issued);
        state.valid_access.insert(access.clone());
        state.valid_refresh.insert(refresh.clone());
        (access, refresh)
    }

    fn authorized(&self, request: &RecordedRequest) -> bool {
        let state = self.state.lock().unwrap();
        !state.reject_all_bearers
            && request
                .bearer
                .as_ref()
                .is_some_and(|token| state.valid_access.contains(token))
    }

    fn login(&self, body: &Value) -> HttpResponse {
        if body["username"] != "alice" || body["password"] != "good" {
            return respond(
                401,
                json!({ "success": false, "message": "Invalid username or password" }),
            );
        }
        let (access, refresh) = Self::issue_pair(&mut self.state.lock().unwrap());
        respond(
            200,
            json!({
                "success": true,
                "message": "Login successful",
                "data": {
                    "access_token": access,
                    "refresh_token": refresh,
                    "token_type": "bearer",
                    "expires_in": 1800,
                    "user": alice_json(),
                }
            }),
        )
    }

    async fn refresh(&self, body: &Value) -> HttpResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;

        let mut state = self.state.lock().unwrap();
        let presented = body["refresh_token"].as_str().unwrap_or_default().to_string();
        if state.reject_refresh || !state.valid_refresh.remove(&presented) {
            return respond(401, json!({ "detail": "Invalid refresh token" }));
        }
        let (access, refresh) = Self::issue_pair(&mut state);
        respond(
            200,
            json!({
                "success": true,
                "message": "Token refreshed",
                "data": { "access_token": access, "refresh_token": refresh, "token_type": "bearer" }
            }),
        )
    }

    fn sessions_listing(&self) -> Value {
        let ids = self.state.lock().unwrap().session_ids.clone();
        let sessions: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "device_name": format!("Device {}", id),
                    "ip_address": "127.0.0.1",
                    "user_agent": "session-core/0.1.0",
                    "issued_at": "2024-05-01T10:00:00",
                    "last_used": "2024-05-01T10:30:00",
                    "expires_at": "2024-05-08T10:00:00",
                    "is_current_session": *id == 1,
                })
            })
            .collect();
        json!({
            "success": true,
            "message": "Active sessions retrieved",
            "total_sessions": sessions.len(),
            "current_session_id": 1,
            "sessions": sessions,
        })
    }

    fn revoke(&self, session_id: i64) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        if session_id == 1 {
            return respond(403, json!({ "detail": "Use logout to end the current session" }));
        }
        let before = state.session_ids.len();
        state.session_ids.retain(|id| *id != session_id);
        if state.session_ids.len() == before {
            return respond(404, json!({ "detail": "Session not found" }));
        }
        respond(
            200,
            json!({ "success": true, "message": "Session revoked", "revoked_sessions": 1 }),
        )
    }

    fn revoke_others(&self) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let revoked = state.session_ids.iter().filter(|id| **id != 1).count();
        state.session_ids.retain(|id| *id == 1);
        respond(
            200,
            json!({ "success": true, "message": "Logged out from other devices", "revoked_sessions": revoked }),
        )
    }

    fn revoke_all(&self) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let revoked = state.session_ids.len();
        state.session_ids.clear();
        state.valid_access.clear();
        state.valid_refresh.clear();
        respond(
            200,
            json!({ "success": true, "message": "Logged out from all devices", "revoked_sessions": revoked }),
        )
    }
}

#[async_trait]
impl HttpClient for FakeApi {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        let recorded = RecordedRequest {
            method: request.method,
            path: path.clone(),
            bearer: request.bearer().map(str::to_string),
            body: request
                .body
                .as_ref()
                .and_then(|b| serde_json::from_slice(b).ok()),
        };
        self.requests.lock().unwrap().push(recorded.clone());

        if self.state.lock().unwrap().offline {
            return Err(BridgeError::Network("connection refused".to_string()));
        }

        let body = recorded.body.clone().unwrap_or(Value::Null);
        let response = match (request.method, path.as_str()) {
            (HttpMethod::Post, "/login") => self.login(&body),
            (HttpMethod::Post, "/refresh") => self.refresh(&body).await,
            (HttpMethod::Post, "/logout") => {
                respond(200, json!({ "success": true, "message": "Logged out" }))
            }
            _ if !self.authorized(&recorded) => {
                respond(401, json!({ "detail": "Could not validate credentials" }))
            }
            (HttpMethod::Get, "/me") => respond(
                200,
                json!({ "success": true, "message": "User retrieved", "data": alice_json() }),
            ),
            (HttpMethod::Get, "/sessions") => respond(200, self.sessions_listing()),
            (HttpMethod::Delete, "/sessions") => self.revoke_others(),
            (HttpMethod::Delete, "/sessions/all") => self.revoke_all(),
            (HttpMethod::Delete, other) => match other
                .strip_prefix("/sessions/")
                .and_then(|id| id.parse::<i64>().ok())
            {
                Some(id) => self.revoke(id),
                None => respond(404, json!({ "detail": "Not found" })),
            },
            (HttpMethod::Get, "/broken") => {
                respond(500, json!({ "detail": "Internal server error" }))
            }
            _ => respond(404, json!({ "detail": "Not found" })),
        };
        Ok(response)
    }
}

fn respond(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub fn alice_json() -> Value {
    json!({
        "id": 1,
        "username": "alice",
        "email": "alice@example.com",
        "full_name": "Alice Example",
        "role_id": 2,
        "is_active": true,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": "2024-01-01T00:00:00",
    })
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub store: MemorySecureStore,
    pub client: ApiClient,
    pub manager: SessionManager,
    pub events: EventBus,
}

pub fn harness(api: Arc<FakeApi>) -> Harness {
    harness_with_store(api, MemorySecureStore::new())
}

pub fn harness_with_store(api: Arc<FakeApi>, store: MemorySecureStore) -> Harness {
    let config = ClientConfig::builder()
        .base_url(BASE_URL)
        .timeout(Duration::from_secs(5))
        .secure_store(Arc::new(store.clone()))
        .build()
        .unwrap();
    let events = EventBus::default();
    let client = ApiClient::new(&config, api.clone(), events.clone());
    let manager = SessionManager::new(client.clone());

    Harness {
        api,
        store,
        client,
        manager,
        events,
    }
}

/// Logs alice in and checks it worked.
pub async fn signed_in(api: Arc<FakeApi>) -> Harness {
    let harness = harness(api);
    let outcome = harness.manager.login("alice", "good").await;
    assert!(outcome.success, "login failed: {}", outcome.message);
    harness
}
