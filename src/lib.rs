//! Workspace placeholder crate.
//!
//! This crate exposes the feature flags that map onto the individual workspace
//! crates. Host applications can depend on `session-core-workspace`, enable
//! `desktop-shims`, and reach the bootstrap façade through the re-export below
//! without wiring `core-service` themselves.

#[cfg(feature = "desktop-shims")]
pub use core_service;
