//! Integration tests for listing and revoking login sessions.

mod common;

use bridge_traits::HttpMethod;
use core_auth::{AuthError, AuthState};
use core_runtime::events::{CoreEvent, SessionEvent};

use common::{harness, signed_in, FakeApi};

#[tokio::test]
async fn test_listing_is_cached() {
    let h = signed_in(FakeApi::new()).await;
    let sessions = h.manager.sessions().unwrap();

    let first = sessions.list().await.unwrap();
    let second = sessions.list().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total_sessions, 3);
    assert_eq!(first.current().unwrap().id, 1);
    assert!(first.current().unwrap().issued_at_utc().is_some());
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/sessions").len(), 1);

    let fresh = sessions.fetch().await.unwrap();
    assert_eq!(fresh.total_sessions, 3);
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/sessions").len(), 2);
}

#[tokio::test]
async fn test_revoke_updates_cached_listing() {
    let h = signed_in(FakeApi::new()).await;
    let sessions = h.manager.sessions().unwrap();
    let mut events = h.events.subscribe();
    sessions.list().await.unwrap();

    let response = sessions.revoke(2).await.unwrap();

    assert!(response.success);
    assert_eq!(response.revoked_sessions, Some(1));
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Sessions(SessionEvent::Revoked { session_id: 2 })
    );

    let listing = sessions.list().await.unwrap();
    assert_eq!(listing.total_sessions, 2);
    assert!(listing.sessions.iter().all(|s| s.id != 2));
    // Served from the edited cache.
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/sessions").len(), 1);
}

#[tokio::test]
async fn test_revoke_errors_map_to_messages() {
    let h = signed_in(FakeApi::new()).await;
    let sessions = h.manager.sessions().unwrap();
    sessions.list().await.unwrap();

    let missing = sessions.revoke(99).await.unwrap_err();
    assert_eq!(missing, AuthError::SessionNotFound(99));
    assert_eq!(missing.to_string(), "Session not found or already logged out");

    let current = sessions.revoke(1).await.unwrap_err();
    assert_eq!(
        current,
        AuthError::Forbidden("Cannot revoke this session".to_string())
    );

    // A failed mutation drops the cached listing.
    sessions.list().await.unwrap();
    assert_eq!(h.api.requests_to(HttpMethod::Get, "/sessions").len(), 2);
}

#[tokio::test]
async fn test_revoke_others_keeps_only_current_session() {
    let h = signed_in(FakeApi::new()).await;
    let sessions = h.manager.sessions().unwrap();
    let mut events = h.events.subscribe();
    sessions.list().await.unwrap();

    let response = sessions.revoke_others().await.unwrap();

    assert_eq!(response.revoked_sessions, Some(2));
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Sessions(SessionEvent::OthersRevoked { revoked: 2 })
    );
    let listing = sessions.list().await.unwrap();
    assert_eq!(listing.total_sessions, 1);
    assert!(listing.sessions[0].is_current_session);
    assert_eq!(h.api.requests_to(HttpMethod::Delete, "/sessions").len(), 1);
}

#[tokio::test]
async fn test_logout_everywhere_revokes_then_clears_locally() {
    let h = signed_in(FakeApi::new()).await;
    h.manager.sessions().unwrap().list().await.unwrap();

    let outcome = h.manager.logout_everywhere().await;

    assert!(outcome.server_acknowledged);
    assert_eq!(h.api.requests_to(HttpMethod::Delete, "/sessions/all").len(), 1);
    assert_eq!(h.manager.state().current(), AuthState::Anonymous);
    assert!(h.store.is_empty().await);
    assert!(h.manager.cache().is_empty());
    assert_eq!(h.manager.sessions().unwrap_err(), AuthError::NotAuthenticated);
}

#[tokio::test]
async fn test_logout_everywhere_clears_locally_when_offline() {
    let h = signed_in(FakeApi::new()).await;
    h.api.set_offline(true);

    let outcome = h.manager.logout_everywhere().await;

    assert!(!outcome.server_acknowledged);
    assert!(h.store.is_empty().await);
    assert!(!h.manager.snapshot().is_authenticated);
}

#[tokio::test]
async fn test_expired_session_listing_reports_login_again() {
    let h = signed_in(FakeApi::new()).await;
    let sessions = h.manager.sessions().unwrap();
    h.api.expire_access_tokens();
    h.api.reject_refresh(true);

    let err = sessions.list().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::SessionExpired("Please login again to view your sessions".to_string())
    );
    assert_eq!(h.manager.state().current(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_sessions_require_an_account() {
    let h = harness(FakeApi::new());
    assert_eq!(h.manager.sessions().unwrap_err(), AuthError::NotAuthenticated);

    h.manager.guest().await;
    assert_eq!(h.manager.sessions().unwrap_err(), AuthError::GuestNotAllowed);
    assert!(h.api.requests().is_empty());
}
