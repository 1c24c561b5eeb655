//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the session client core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types, its logging conventions, and the broadcast channel used to publish
//! authentication events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ApiEndpoints, AppInfo, ClientConfig, ClientConfigBuilder, Environment, StorageKeys};
pub use error::{Error, Result};
