//! Integration tests for bearer injection and refresh-on-401 recovery.
//!
//! These tests verify:
//! - One refresh call serves any number of concurrent 401s
//! - A request is retried at most once
//! - A failed refresh tears credentials down exactly once per cycle

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bridge_traits::HttpMethod;
use core_auth::{ApiError, AuthState, UserProfile};
use core_runtime::events::{AuthEvent, CoreEvent};
use futures::future::join_all;

use common::{signed_in, FakeApi};

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_resent() {
    let h = signed_in(FakeApi::new()).await;
    h.api.expire_access_tokens();

    let envelope = h.client.get::<UserProfile>("/me").await.unwrap();
    assert_eq!(envelope.data.unwrap().username, "alice");

    let me_requests = h.api.requests_to(HttpMethod::Get, "/me");
    let bearers: Vec<_> = me_requests.iter().map(|r| r.bearer.as_deref()).collect();
    assert_eq!(bearers, vec![Some("A1"), Some("A2")]);

    let refreshes = h.api.requests_to(HttpMethod::Post, "/refresh");
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].bearer, None);
    assert_eq!(refreshes[0].body.as_ref().unwrap()["refresh_token"], "R1");

    assert_eq!(h.client.tokens().access_token().await.as_deref(), Some("A2"));
    assert_eq!(h.client.tokens().refresh_token().await.as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_concurrent_401s_share_a_single_refresh() {
    let h = signed_in(FakeApi::new()).await;
    h.api.expire_access_tokens();

    let results = join_all((0..5).map(|_| h.client.get::<UserProfile>("/me"))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(h.client.refresh_coordinator().cycles_started(), 1);

    let retried: Vec<_> = h
        .api
        .requests_to(HttpMethod::Get, "/me")
        .into_iter()
        .filter(|r| r.bearer.as_deref() == Some("A2"))
        .collect();
    assert_eq!(retried.len(), 5);
}

#[tokio::test]
async fn test_concurrent_401s_across_tasks_share_a_single_refresh() {
    let h = signed_in(FakeApi::new()).await;
    h.api.expire_access_tokens();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.get::<UserProfile>("/me").await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(h.api.refresh_calls(), 1);
}

#[tokio::test]
async fn test_retry_happens_at_most_once() {
    let h = signed_in(FakeApi::new()).await;
    h.api.reject_all_bearers(true);

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    h.client.on_auth_failure(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = h.client.get::<UserProfile>("/me").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/me").len(), 2);
    assert_eq!(h.api.refresh_calls(), 1);
    // The refresh itself worked, so nothing is torn down.
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(h.client.tokens().access_token().await.as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_failed_refresh_tears_down_once_per_cycle() {
    let h = signed_in(FakeApi::new()).await;
    h.api.expire_access_tokens();
    h.api.reject_refresh(true);

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    h.client.on_auth_failure(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut events = h.events.subscribe();

    let results = join_all((0..3).map(|_| h.client.get::<UserProfile>("/me"))).await;

    for result in &results {
        assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
    }
    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    assert!(h.client.tokens().access_token().await.is_none());
    assert!(h.client.tokens().refresh_token().await.is_none());
    assert!(h.client.tokens().user_profile().await.is_none());
    assert!(h.store.is_empty().await);

    // The session manager follows the teardown.
    assert_eq!(h.manager.state().current(), AuthState::Anonymous);

    let mut saw_expiry = false;
    while let Ok(event) = events.try_recv() {
        if event == CoreEvent::Auth(AuthEvent::SessionExpired) {
            saw_expiry = true;
        }
    }
    assert!(saw_expiry);
}

#[tokio::test]
async fn test_next_failed_cycle_tears_down_again() {
    let h = signed_in(FakeApi::new()).await;
    h.api.expire_access_tokens();
    h.api.reject_refresh(true);

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    h.client.on_auth_failure(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    h.client.get::<UserProfile>("/me").await.unwrap_err();
    // No tokens left: the next cycle fails fast without a network call.
    h.client.get::<UserProfile>("/me").await.unwrap_err();

    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(h.client.refresh_coordinator().cycles_started(), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_errors_are_not_retried_and_reach_global_handlers() {
    let h = signed_in(FakeApi::new()).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.client
        .on_global_error(move |e| sink.lock().unwrap().push(e.status()));

    let err = h.client.get::<()>("/broken").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_envelope::<()>().message, "Internal server error");
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/broken").len(), 1);
    assert_eq!(h.api.refresh_calls(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![Some(500)]);
}

#[tokio::test]
async fn test_network_failure_maps_to_fixed_envelope() {
    let h = signed_in(FakeApi::new()).await;
    h.api.set_offline(true);

    let err = h.client.get::<UserProfile>("/me").await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
    let envelope = err.to_envelope::<()>();
    assert_eq!(envelope.message, "Network error. Please check your connection.");
    assert_eq!(envelope.error_code.as_deref(), Some("NETWORK_ERROR"));
    // Transport failures never trigger a refresh.
    assert_eq!(h.api.refresh_calls(), 0);
}
