//! Secure Key-Value Storage
//!
//! The only persistence the session client needs: a handful of string
//! secrets (tokens and a serialized profile) addressed by string keys.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts secure storage mechanisms:
/// - macOS/iOS: Keychain
/// - Android: Keystore (hardware-backed when available)
/// - Windows: Credential Manager
/// - Linux: Secret Service / libsecret
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Use platform-provided secure storage when available
/// - Never log or expose stored values
///
/// Callers that cannot tolerate failures (the token store) wrap this trait
/// and degrade errors themselves; implementations should report every
/// failure as an error rather than swallowing it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("access_token", token).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value under `key`.
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without handing the value to the caller
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// Delete several secrets, stopping at the first failure.
    async fn delete_secrets(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete_secret(key).await?;
        }
        Ok(())
    }
}
