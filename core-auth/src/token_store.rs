//! Secure Token Storage
//!
//! Persists the access token, refresh token, and serialized user profile
//! through the host's [`SecureStore`].
//!
//! ## Failure model
//!
//! The token store never fails. A storage error on read is logged and
//! reported as `None`, the same as a missing entry. A storage error on write
//! or delete is logged and dropped. Callers therefore only ever see "have a
//! value" or "don't", which is what the refresh and hydration logic needs.
//!
//! Token values are never logged; only key names and error descriptions are.
//!
//! ## Session generation
//!
//! Every write that starts or ends a session ([`TokenStore::store_session`],
//! [`TokenStore::store_credentials`], [`TokenStore::clear`]) bumps a
//! generation counter under an async lock. A refresh cycle records the
//! generation it started in and writes through
//! [`TokenStore::store_refreshed`], which refuses once the generation has
//! moved on. A logout or login that lands mid-refresh therefore always wins.
//!
//! ## Example
//!
//! ```ignore
//! use core_auth::{CredentialPair, TokenStore};
//! use core_runtime::config::StorageKeys;
//!
//! let store = TokenStore::new(secure_store, StorageKeys::default());
//! store.store_credentials(&CredentialPair::new("A1", "R1")).await;
//! assert_eq!(store.access_token().await.as_deref(), Some("A1"));
//! store.clear().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_traits::SecureStore;
use core_runtime::config::StorageKeys;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{CredentialPair, RefreshData, UserProfile};

/// The three entries that make up a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
    User,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::Access, TokenKind::Refresh, TokenKind::User];
}

/// Infallible facade over the secure store.
///
/// Cloning is cheap and every clone addresses the same entries.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
    keys: Arc<StorageKeys>,
    /// Held across every generation check and the writes it guards.
    session: Arc<Mutex<()>>,
    generation: Arc<AtomicU64>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, keys: StorageKeys) -> Self {
        debug!(
            access_key = %keys.access_token,
            refresh_key = %keys.refresh_token,
            user_key = %keys.user_data,
            "Initializing TokenStore"
        );
        Self {
            secure_store,
            keys: Arc::new(keys),
            session: Arc::new(Mutex::new(())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn key(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.keys.access_token,
            TokenKind::Refresh => &self.keys.refresh_token,
            TokenKind::User => &self.keys.user_data,
        }
    }

    /// Reads an entry. Missing entries and storage failures both yield `None`.
    pub async fn get(&self, kind: TokenKind) -> Option<String> {
        let key = self.key(kind);
        match self.secure_store.get_secret(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read from secure store");
                None
            }
        }
    }

    pub async fn set(&self, kind: TokenKind, value: &str) {
        let key = self.key(kind);
        if let Err(e) = self.secure_store.set_secret(key, value).await {
            warn!(key = %key, error = %e, "Failed to write to secure store");
        }
    }

    pub async fn remove(&self, kind: TokenKind) {
        let key = self.key(kind);
        if let Err(e) = self.secure_store.delete_secret(key).await {
            warn!(key = %key, error = %e, "Failed to delete from secure store");
        }
    }

    /// Removes all three entries and ends the current generation. A failure
    /// on one entry does not stop the others from being removed.
    pub async fn clear(&self) {
        let _session = self.session.lock().await;
        self.remove_all().await;
        let generation = self.bump();
        debug!(generation, "Cleared stored credentials");
    }

    /// Clears only if no session change happened since `generation`.
    pub async fn clear_if_current(&self, generation: u64) -> bool {
        let _session = self.session.lock().await;
        if self.generation() != generation {
            return false;
        }
        self.remove_all().await;
        let generation = self.bump();
        debug!(generation, "Cleared stored credentials");
        true
    }

    async fn remove_all(&self) {
        for kind in TokenKind::ALL {
            self.remove(kind).await;
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.get(TokenKind::Access).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.get(TokenKind::Refresh).await
    }

    /// The persisted profile. A corrupt entry is logged and treated as absent.
    pub async fn user_profile(&self) -> Option<UserProfile> {
        let raw = self.get(TokenKind::User).await?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Stored user profile is not valid JSON");
                None
            }
        }
    }

    /// Stores a fresh token pair as a new generation.
    pub async fn store_credentials(&self, credentials: &CredentialPair) {
        let _session = self.session.lock().await;
        self.write_pair(credentials).await;
        self.bump();
    }

    /// Stores a fresh token pair and its user as a new generation.
    pub async fn store_session(&self, credentials: &CredentialPair, user: &UserProfile) {
        let _session = self.session.lock().await;
        self.write_pair(credentials).await;
        self.store_user(user).await;
        let generation = self.bump();
        debug!(generation, user_id = user.id, "Stored new session");
    }

    /// Writes the result of a refresh that started in `generation`.
    ///
    /// Returns `false`, writing nothing, if the session changed meanwhile.
    pub async fn store_refreshed(&self, generation: u64, data: &RefreshData) -> bool {
        let _session = self.session.lock().await;
        if self.generation() != generation {
            return false;
        }
        self.set(TokenKind::Access, &data.access_token).await;
        if let Some(rotated) = data.refresh_token.as_deref() {
            self.set(TokenKind::Refresh, rotated).await;
        }
        if let Some(user) = data.user.as_ref() {
            self.store_user(user).await;
        }
        true
    }

    async fn write_pair(&self, credentials: &CredentialPair) {
        self.set(TokenKind::Access, &credentials.access_token).await;
        self.set(TokenKind::Refresh, &credentials.refresh_token).await;
    }

    pub async fn store_user(&self, user: &UserProfile) {
        match serde_json::to_string(user) {
            Ok(json) => self.set(TokenKind::User, &json).await,
            Err(e) => warn!(error = %e, "Failed to serialize user profile"),
        }
    }

    /// Credentials currently on disk, if both tokens are present.
    pub async fn credentials(&self) -> Option<CredentialPair> {
        let access = self.access_token().await?;
        let refresh = self.refresh_token().await?;
        Some(CredentialPair::new(access, refresh))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys", &self.keys)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
