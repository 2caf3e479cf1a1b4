//! Logging setup.
//!
//! Library code only emits `tracing` events; the binary installs a
//! subscriber once at startup with [`init_logging`]. Logs go to stderr so a
//! report printed on stdout stays machine-readable.

use clap::ValueEnum;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, multi-line events.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` controls filtering (e.g. `parquetize=debug`); the default
/// level is `info`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // A subscriber installed elsewhere (e.g. by a test harness) wins.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
        };
    });
}

/// Span wrapping a whole conversion or upload run.
#[must_use]
pub fn run_span(operation: &str, files: usize) -> Span {
    tracing::info_span!("run", op = operation, files = files)
}
