//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host platform implements for the
//! session client core.
//!
//! ## Overview
//!
//! This crate defines the contract between the core library and
//! platform-specific implementations. Each trait is a capability the core
//! requires but that must be provided differently per platform.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Raw async HTTP transport with timeouts
//! - [`SecureStore`](storage::SecureStore) - String secret persistence (Keychain/Keystore)
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report timeouts as [`BridgeError::Timeout`] and unreachable hosts as
//!   [`BridgeError::Network`] so the core can tell them apart
//! - Never include secret values in error messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! across async tasks.

pub mod error;
pub mod http;
pub mod logging;
pub mod storage;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use storage::SecureStore;
