//! Integration tests for the logging system.
//!
//! A process can install only one global subscriber, so everything that
//! depends on `init_logging` lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_global_init_forwards_workspace_events_and_rejects_second_init() {
    let sink = Arc::new(CapturingSink::default());
    let trait_sink: Arc<dyn LoggerSink> = sink.clone();

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(trait_sink);

    init_logging(config).expect("first initialization succeeds");

    tracing::warn!(
        target: "core_auth::client",
        status = 503u64,
        authorization = "Bearer A1",
        "request failed"
    );
    // Below the configured level for workspace crates.
    tracing::debug!(target: "core_auth::client", "filtered out");
    // Dependency noise is held at warn.
    tracing::info!(target: "reqwest::connect", "connecting");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1, "unexpected entries: {:?}", *entries);

        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "request failed");
        assert_eq!(entry.fields.get("status"), Some(&"503".to_string()));
        assert_eq!(
            entry.fields.get("authorization"),
            Some(&"[REDACTED]".to_string())
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Logging(_))));
}

#[test]
fn test_pii_redaction() {
    assert_eq!(redact_if_sensitive("access_token", "A1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "R1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "good"), "[REDACTED]");

    let redacted = redact_if_sensitive("email", "alice@example.com");
    assert!(redacted.starts_with('a'));
    assert!(!redacted.contains("example.com"));

    assert_eq!(redact_if_sensitive("session_id", "42"), "42");
}
