//! Logging setup.
//!
//! `RUST_LOG` takes precedence when set; otherwise the configured level is
//! applied to every target.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Parse a level name into a filter.
///
/// Accepts the usual tracing names plus the spellings found in Python style
/// configs (`WARNING`, `CRITICAL`, `NOTSET`), case-insensitively.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    let normalized = level.trim().to_ascii_lowercase();
    let filter = match normalized.as_str() {
        "trace" | "notset" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" | "critical" | "fatal" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => return Err(Error::config(format!("unknown log level: {level}"))),
    };
    Ok(filter)
}

/// Build the filter used by [`init`].
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = parse_level(level)?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

/// Install the global subscriber.
pub fn init(level: &str) -> Result<()> {
    let filter = build_filter(level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install logger: {e}")))
}
