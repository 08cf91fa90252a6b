//! # Console Logging
//!
//! `esd-console` writes two streams. Stdout carries what a command produces:
//! converted amounts, pair quotes, the regulation table and the final
//! `simulate` summary. Every `tracing` event goes to stderr, so piping
//! `simulate --log-format json` keeps stdout a single JSON document.
//!
//! Filtering comes from `RUST_LOG` when it is set and from
//! [`DEFAULT_DIRECTIVES`] otherwise.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Wallet transitions, dispatched transactions and poll session start/stop
/// from both crates; per-cycle fetch events stay at debug.
pub const DEFAULT_DIRECTIVES: &str = "esd_console=info,esd_client=info";

/// How events are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Terminal output with targets and line numbers.
    Pretty,
    /// One JSON object per event. `simulate` also stops printing the table.
    Json,
}

fn filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Installs the global subscriber. Must run once, before the first command
/// logs anything.
///
/// To watch every poll cycle:
///
/// ```text
/// RUST_LOG=esd_client::poller=debug esd-console simulate --cycles 3
/// ```
pub fn init_logging(default_directives: &str, format: LogFormat) {
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
    });
    let json = (format == LogFormat::Json)
        .then(|| fmt::layer().json().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(filter(default_directives))
        .with(pretty)
        .with(json)
        .init();

    tracing::debug!(?format, "console logging ready");
}
