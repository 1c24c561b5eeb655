//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate, wrapped in
//!   [`FallbackSecureStore`] so a missing keychain degrades to memory
//! - [`MemorySecureStore`] for tests and hosts without a keychain
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_secure_store, ReqwestHttpClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http_client = ReqwestHttpClient::with_timeout(Duration::from_secs(10))?;
//!     let secure_store = default_secure_store("my-app");
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod fallback;
mod http;
mod memory_store;

#[cfg(feature = "secure-store")]
mod secure_store;

use bridge_traits::SecureStore;
use std::sync::Arc;

pub use fallback::FallbackSecureStore;
pub use http::ReqwestHttpClient;
pub use memory_store::MemorySecureStore;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};

/// Best secure store available on this build.
///
/// With `secure-store` enabled this is the OS keychain behind an in-memory
/// fallback; without it, memory only.
pub fn default_secure_store(service_name: &str) -> Arc<dyn SecureStore> {
    #[cfg(feature = "secure-store")]
    {
        Arc::new(FallbackSecureStore::new(Arc::new(
            KeyringSecureStore::with_service_name(service_name),
        )))
    }

    #[cfg(not(feature = "secure-store"))]
    {
        tracing::debug!(service_name, "Keyring support disabled, using in-memory secure store");
        Arc::new(MemorySecureStore::new())
    }
}
