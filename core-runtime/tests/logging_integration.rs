//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_address, redact_locator, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// The global subscriber can only be installed once per process, so every
// assertion about it lives in this single test.
#[tokio::test]
async fn global_subscriber_mirrors_into_sink_and_refuses_second_install() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(
        target: "core_service::switcher",
        address = %redact_address("http://192.168.1.20:8080"),
        "Media server ready"
    );
    tracing::debug!(target: "core_playback::local", "below the sink's Info level");
    tracing::info!(target: "hyper::proto", "filtered out as a dependency");

    // Entries are forwarded from a spawned task when a runtime is present.
    tokio::time::sleep(Duration::from_millis(20)).await;

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Media server ready");
        assert_eq!(
            entries[0].fields.get("address").map(String::as_str),
            Some("http://***:8080")
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Logging(_))));
}

#[test]
fn locator_redaction_keeps_only_the_file_name() {
    assert_eq!(
        redact_locator("/storage/emulated/0/Music/Album/01 - Intro.mp3"),
        "01 - Intro.mp3"
    );
    assert_eq!(redact_locator(""), "");
}
