//! In-memory query cache.
//!
//! Holds decoded responses for a bounded time so repeated reads of `/me` and
//! the session listing don't hit the network. Entries are typed on the way in
//! and downcast on the way out; a read with the wrong type is a miss.
//!
//! The cache is synchronous so it can be cleared from auth-failure handlers,
//! which are plain callbacks.

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

pub const DEFAULT_CAPACITY: usize = 64;

/// Cache key for the current user's profile.
pub const PROFILE_KEY: &str = "auth/me";

/// Cache key for the session listing.
pub const SESSIONS_KEY: &str = "sessions/list";

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Shared TTL + LRU cache. Cloning is cheap.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Mutex<LruCache<String, Entry>>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh value under `key`, if any. Stale entries are evicted on read.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            trace!(key, "Cache entry is stale");
            entries.pop(key);
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: &str, value: T, stale_time: Duration) {
        trace!(key, stale_ms = stale_time.as_millis() as u64, "Caching query result");
        self.lock().put(
            key.to_string(),
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + stale_time,
            },
        );
    }

    /// Replaces a fresh entry with `f(old)`, keeping its expiry.
    ///
    /// Returns `false` when there is nothing fresh of type `T` to update.
    pub fn update<T, F>(&self, key: &str, f: F) -> bool
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if entry.expires_at <= Instant::now() {
            return false;
        }
        let Some(current) = entry.value.downcast_ref::<T>() else {
            return false;
        };
        let next = f(current);
        entry.value = Arc::new(next);
        true
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().pop(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Entries currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache").field("len", &self.len()).finish()
    }
}
