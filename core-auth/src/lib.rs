//! # Session Client Core
//!
//! Authenticated HTTP access for a token-based API.
//!
//! ## Overview
//!
//! This crate keeps a user signed in against a server that issues short-lived
//! access tokens and long-lived refresh tokens. It persists credentials
//! through the host's secure store, injects bearer tokens, recovers from
//! expired tokens with a single shared refresh, and exposes an observable
//! session state for presentation layers.
//!
//! ## Components
//!
//! - [`TokenStore`] - infallible credential persistence
//! - [`RefreshCoordinator`] - single-flight token refresh
//! - [`ApiClient`] - bearer injection and refresh-on-401 retry
//! - [`AuthSessionState`] - observable auth state
//! - [`SessionManager`] - login, guest, logout, startup hydration
//! - [`SessionsApi`] - listing and revoking login sessions
//! - [`QueryCache`] - short-lived cache for `/me` and the session listing

pub mod cache;
pub mod client;
pub mod error;
pub mod manager;
pub mod refresh;
pub mod sessions;
pub mod state;
pub mod token_store;
pub mod types;

pub use cache::QueryCache;
pub use client::{ApiClient, ApiRequest, RequestOptions};
pub use error::{ApiError, AuthError, Result};
pub use manager::{LoginOutcome, LogoutOutcome, SessionManager};
pub use refresh::{
    HttpTokenRefresher, RefreshCoordinator, RefreshFailure, RefreshTicket, TokenRefresher,
};
pub use sessions::SessionsApi;
pub use state::{AuthSessionState, AuthSnapshot, AuthState, SubscriptionId};
pub use token_store::{TokenKind, TokenStore};
pub use types::{
    ActiveSessions, ApiEnvelope, CredentialPair, SessionActionResponse, SessionInfo, UserProfile,
};
