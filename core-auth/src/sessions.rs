//! # Login Session Management
//!
//! Lists the user's active sessions across devices and revokes them.
//!
//! Obtain a [`SessionsApi`] through
//! [`SessionManager::sessions`](crate::manager::SessionManager::sessions),
//! which refuses guests and signed-out users before any request is made.
//!
//! The listing is cached for thirty seconds. Successful revocations edit the
//! cached listing in place; failed ones drop it so the next read is fresh.

use std::time::Duration;

use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use tracing::{info, instrument, warn};

use crate::cache::{QueryCache, SESSIONS_KEY};
use crate::client::{ApiClient, ApiRequest};
use crate::error::{ApiError, AuthError, Result};
use crate::types::{ActiveSessions, SessionActionResponse};

pub const SESSIONS_STALE_TIME: Duration = Duration::from_secs(30);

const LIST_UNAUTHORIZED: &str = "Please login again to view your sessions";
const LIST_FORBIDDEN: &str = "You do not have permission to view sessions";
const MANAGE_UNAUTHORIZED: &str = "Please login again to manage sessions";
const REVOKE_FORBIDDEN: &str = "Cannot revoke this session";

/// Session listing and revocation for the signed-in user.
#[derive(Debug, Clone)]
pub struct SessionsApi {
    client: ApiClient,
    cache: QueryCache,
    event_bus: EventBus,
}

impl SessionsApi {
    pub(crate) fn new(client: ApiClient, cache: QueryCache, event_bus: EventBus) -> Self {
        Self {
            client,
            cache,
            event_bus,
        }
    }

    /// Active sessions, served from cache while fresh.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<ActiveSessions> {
        if let Some(cached) = self.cache.get::<ActiveSessions>(SESSIONS_KEY) {
            return Ok(cached);
        }
        self.fetch().await
    }

    /// Active sessions straight from the server.
    pub async fn fetch(&self) -> Result<ActiveSessions> {
        let path = self.client.endpoints().sessions.clone();
        let listing: ActiveSessions = self
            .client
            .call(ApiRequest::get(path))
            .await
            .map_err(|e| match e.status() {
                Some(401) => AuthError::SessionExpired(LIST_UNAUTHORIZED.to_string()),
                Some(403) => AuthError::Forbidden(LIST_FORBIDDEN.to_string()),
                _ => AuthError::Api(e),
            })?;

        if !listing.success {
            return Err(AuthError::rejected(listing.message, listing.error_code));
        }

        self.cache
            .insert(SESSIONS_KEY, listing.clone(), SESSIONS_STALE_TIME);
        Ok(listing)
    }

    /// Signs one device out.
    #[instrument(skip(self))]
    pub async fn revoke(&self, session_id: i64) -> Result<SessionActionResponse> {
        let path = self.client.endpoints().session(session_id);
        let response = self
            .mutate(ApiRequest::delete(path), |e| match e.status() {
                Some(401) => AuthError::SessionExpired(MANAGE_UNAUTHORIZED.to_string()),
                Some(403) => AuthError::Forbidden(REVOKE_FORBIDDEN.to_string()),
                Some(404) => AuthError::SessionNotFound(session_id),
                _ => AuthError::Api(e),
            })
            .await?;

        self.cache
            .update::<ActiveSessions, _>(SESSIONS_KEY, |listing| listing.without(session_id));
        info!(session_id, "Session revoked");
        let _ = self
            .event_bus
            .emit(CoreEvent::Sessions(SessionEvent::Revoked { session_id }));
        Ok(response)
    }

    /// Signs every other device out, keeping this one.
    #[instrument(skip(self))]
    pub async fn revoke_others(&self) -> Result<SessionActionResponse> {
        let path = self.client.endpoints().sessions.clone();
        let response = self
            .mutate(ApiRequest::delete(path), manage_error)
            .await?;

        self.cache
            .update::<ActiveSessions, _>(SESSIONS_KEY, ActiveSessions::only_current);
        let revoked = response.revoked_sessions.unwrap_or(0);
        info!(revoked, "Other sessions revoked");
        let _ = self
            .event_bus
            .emit(CoreEvent::Sessions(SessionEvent::OthersRevoked { revoked }));
        Ok(response)
    }

    /// Signs every device out, this one included.
    ///
    /// Only the server side is affected; local credentials are left to
    /// [`SessionManager::logout_everywhere`](crate::manager::SessionManager::logout_everywhere).
    #[instrument(skip(self))]
    pub async fn revoke_all(&self) -> Result<SessionActionResponse> {
        let path = self.client.endpoints().all_sessions();
        let response = self
            .mutate(ApiRequest::delete(path), manage_error)
            .await?;

        self.cache.invalidate(SESSIONS_KEY);
        let revoked = response.revoked_sessions.unwrap_or(0);
        info!(revoked, "All sessions revoked");
        let _ = self
            .event_bus
            .emit(CoreEvent::Sessions(SessionEvent::AllRevoked { revoked }));
        Ok(response)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate(SESSIONS_KEY);
    }

    async fn mutate(
        &self,
        request: ApiRequest,
        map_error: impl FnOnce(ApiError) -> AuthError,
    ) -> Result<SessionActionResponse> {
        let outcome = match self.client.call::<SessionActionResponse>(request).await {
            Ok(response) if response.success => Ok(response),
            Ok(response) => Err(AuthError::rejected(response.message, response.error_code)),
            Err(e) => Err(map_error(e)),
        };

        if let Err(e) = &outcome {
            warn!(error = %e, "Session mutation failed");
            self.cache.invalidate(SESSIONS_KEY);
        }
        outcome
    }
}

fn manage_error(error: ApiError) -> AuthError {
    match error.status() {
        Some(401) => AuthError::SessionExpired(MANAGE_UNAUTHORIZED.to_string()),
        _ => AuthError::Api(error),
    }
}
