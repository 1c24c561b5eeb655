//! Secure store with an in-memory fallback.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::memory_store::MemorySecureStore;

/// Routes operations to a primary [`SecureStore`] until it fails once, then
/// permanently switches to a process-local [`MemorySecureStore`].
///
/// Headless Linux sessions and locked keychains make the native store fail
/// at runtime rather than at construction, so the switch happens lazily on
/// the first error instead of being probed up front.
pub struct FallbackSecureStore {
    primary: Arc<dyn SecureStore>,
    fallback: MemorySecureStore,
    degraded: AtomicBool,
}

impl FallbackSecureStore {
    pub fn new(primary: Arc<dyn SecureStore>) -> Self {
        Self {
            primary,
            fallback: MemorySecureStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// True once the primary store has failed and memory is in use.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, operation: &str, error: &BridgeError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                operation,
                error = %error,
                "Secure storage unavailable, falling back to in-memory storage"
            );
        }
    }
}

#[async_trait]
impl SecureStore for FallbackSecureStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        if !self.is_degraded() {
            match self.primary.set_secret(key, value).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("set", &e),
            }
        }
        self.fallback.set_secret(key, value).await
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        if !self.is_degraded() {
            match self.primary.get_secret(key).await {
                Ok(value) => return Ok(value),
                Err(e) => self.degrade("get", &e),
            }
        }
        self.fallback.get_secret(key).await
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        if !self.is_degraded() {
            match self.primary.delete_secret(key).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("delete", &e),
            }
        }
        self.fallback.delete_secret(key).await
    }
}
