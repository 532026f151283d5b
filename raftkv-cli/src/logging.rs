//! Tracing subscriber setup with format selection.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::str::FromStr;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "RAFTKV_LOG_FORMAT";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human-oriented output.
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Level for a `-v` count. A plain start logs at `info`.
fn verbosity_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Pick the filter: `RUST_LOG` wins, otherwise the `-v` count.
fn log_filter(verbosity: u8) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| verbosity_level(verbosity).to_string())
}

/// Pick the format: explicit flag, then the environment, then the terminal.
fn log_format(requested: Option<LogFormat>) -> LogFormat {
    requested
        .or_else(|| {
            std::env::var(LOG_FORMAT_ENV)
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or_else(|| {
            if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                LogFormat::Pretty
            } else {
                LogFormat::Compact
            }
        })
}

/// Install the global subscriber.
pub fn init(verbosity: u8, requested: Option<LogFormat>) -> Result<()> {
    let filter =
        EnvFilter::try_new(log_filter(verbosity)).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format(requested) {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    }
    .context("Failed to initialize tracing subscriber")
}
