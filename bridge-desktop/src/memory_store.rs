//! In-memory secure store.

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local [`SecureStore`] backed by a `HashMap`.
///
/// Values do not survive a restart. Used as the fallback when the platform
/// keychain cannot be reached, and as a lightweight store for tests.
#[derive(Clone, Default)]
pub struct MemorySecureStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_secrets(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
