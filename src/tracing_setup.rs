//! Tracing infrastructure.
//!
//! Structured, async-aware logging for the collector built on `tracing` and
//! `tracing-subscriber`. The configured level acts as the default; the
//! standard `RUST_LOG` environment variable still wins when set, so operators
//! can turn on per-module filtering without touching the config file.
//!
//! Every failure path in the collectors logs through this subscriber with the
//! array identity and operation attached as structured fields.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::CollectorConfig;

/// Initialize tracing from the collector configuration.
///
/// This function is idempotent: if a global subscriber is already installed
/// (as happens across tests), it returns `Ok(())` without error.
pub fn init_from_config(config: &CollectorConfig) -> Result<(), String> {
    let level = parse_log_level(&config.logging.level)?;
    init(level)
}

/// Initialize tracing with an explicit default level.
pub fn init(level: Level) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(level)));

    let fmt_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .or_else(|e| {
            // "already initialized" is expected in tests; anything else is real.
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {}", e))
            }
        })
}

/// Parse a log level string into a tracing `Level`.
fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

fn level_to_filter_string(level: Level) -> String {
    match level {
        Level::TRACE => "trace".to_string(),
        Level::DEBUG => "debug".to_string(),
        Level::INFO => "info".to_string(),
        Level::WARN => "warn".to_string(),
        Level::ERROR => "error".to_string(),
    }
}
