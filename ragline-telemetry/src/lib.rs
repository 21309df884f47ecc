//! # ragline-telemetry
//!
//! Logging setup for ragline services.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber with an
//! [`EnvFilter`](tracing_subscriber::EnvFilter) (`RUST_LOG`, default `info`)
//! and a pretty or JSON formatter. [`memory`] captures events in memory so
//! tests can assert on what was logged.

pub mod memory;

use std::str::FromStr;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub use memory::{CapturedEvent, EventCapture, InMemoryEventLayer};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line output for terminals.
    #[default]
    Pretty,
    /// One JSON object per line for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return `false`.
pub fn init_telemetry(service_name: &str, format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(pretty_layer(std::io::stdout)).try_init().is_ok(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).flatten_event(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(service.name = service_name, ?format, "telemetry initialized");
    }
    installed
}

fn pretty_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer().pretty().with_target(true).with_writer(writer)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn pretty_output_spans_multiple_lines() {
        let buf = SharedBuf::default();
        let writer = {
            let buf = buf.clone();
            move || buf.clone()
        };
        let subscriber = tracing_subscriber::registry().with(pretty_layer(writer));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(chunk_count = 3u64, "ingested document");
        });

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("ingested document"));
        assert!(output.lines().filter(|l| !l.trim().is_empty()).count() > 1);
    }

    #[test]
    fn parses_log_formats() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn second_init_is_a_no_op() {
        init_telemetry("test", LogFormat::Json);
        assert!(!init_telemetry("test", LogFormat::Pretty));
    }
}
