//! Configuration loading for the collector.
//!
//! This module provides strongly-typed configuration loading. Configuration is
//! merged from:
//! 1. a TOML file (`config/collector.toml` by default),
//! 2. environment variables (prefixed with `ESERIES_COLLECTOR_`),
//! 3. command-line overrides applied by `main` on top of the merged result.
//!
//! # Example
//! ```no_run
//! use eseries_collector::config::CollectorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollectorConfig::load()?;
//! println!("Polling every {}s", config.collector.interval_secs);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, CollectorError};

/// Top-level collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectorConfig {
    /// Web services proxy connection settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Time-series store connection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Polling loop settings.
    #[serde(default)]
    pub collector: CollectorSettings,
    /// Logging level and payload-debug toggles.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Arrays to register with the proxy at startup.
    #[serde(default)]
    pub arrays: Vec<ArrayDefinition>,
    /// Fallback password used for array registration when an entry has none.
    #[serde(default)]
    pub array_password: Option<String>,
}

/// Web services proxy connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Socket address (`host` or `host:port`) of the web services proxy.
    #[serde(default = "default_proxy_address")]
    pub address: String,
    /// Basic-auth username for the proxy.
    #[serde(default = "default_username")]
    pub username: String,
    /// Basic-auth password for the proxy.
    #[serde(default = "default_password")]
    pub password: String,
}

/// Time-series store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the InfluxDB HTTP API.
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Database that receives all measurements.
    #[serde(default = "default_database")]
    pub database: String,
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Target polling interval in seconds. Must be positive.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Worker pool size for per-array fan-out. Must be positive.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Run all collection and transformation but skip every store write.
    #[serde(default)]
    pub dry_run: bool,
}

/// Logging level and the per-collector payload-debug toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log iteration count and timing after every tick.
    #[serde(default)]
    pub show_iteration: bool,
    /// Log the array names discovered each tick.
    #[serde(default)]
    pub show_array_names: bool,
    /// Log the drive identifiers found on each array.
    #[serde(default)]
    pub show_drive_names: bool,
    /// Log the volume names found on each array.
    #[serde(default)]
    pub show_volume_names: bool,
    /// Log each disk point payload before it is written.
    #[serde(default)]
    pub show_drive_metrics: bool,
    /// Log each system point payload before it is written.
    #[serde(default)]
    pub show_system_metrics: bool,
    /// Log each volume point payload before it is written.
    #[serde(default)]
    pub show_volume_metrics: bool,
    /// Log each event-log point payload before it is written.
    #[serde(default)]
    pub show_event_metrics: bool,
    /// Log each failure point payload before it is written.
    #[serde(default)]
    pub show_failure_metrics: bool,
}

/// One array to register with the proxy at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayDefinition {
    /// Controller addresses for the array.
    pub addresses: Vec<String>,
    /// Array password; falls back to the top-level `array_password`.
    #[serde(default)]
    pub password: Option<String>,
}

// Default value functions

fn default_proxy_address() -> String {
    "webservices".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_store_url() -> String {
    "http://influxdb:8086".to_string()
}

fn default_database() -> String {
    "eseries".to_string()
}

fn default_interval_secs() -> u64 {
    5
}

fn default_workers() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: default_proxy_address(),
            username: default_username(),
            password: default_password(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            database: default_database(),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            workers: default_workers(),
            dry_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_iteration: false,
            show_array_names: false,
            show_drive_names: false,
            show_volume_names: false,
            show_drive_metrics: false,
            show_system_metrics: false,
            show_volume_metrics: false,
            show_event_metrics: false,
            show_failure_metrics: false,
        }
    }
}

impl CollectorConfig {
    /// Load configuration from `config/collector.toml` and the environment.
    ///
    /// Environment variables override file values with the prefix
    /// `ESERIES_COLLECTOR_`, using `__` as the section separator.
    /// Example: `ESERIES_COLLECTOR_COLLECTOR__INTERVAL_SECS=30`.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/collector.toml")
    }

    /// Load configuration from a specific file path plus the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ESERIES_COLLECTOR_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        if self.collector.interval_secs == 0 {
            return Err(CollectorError::Configuration(
                "interval_secs must be positive".to_string(),
            ));
        }

        if self.collector.workers == 0 {
            return Err(CollectorError::Configuration(
                "workers must be positive".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(CollectorError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        for (idx, array) in self.arrays.iter().enumerate() {
            if array.addresses.is_empty() {
                return Err(CollectorError::Configuration(format!(
                    "arrays[{idx}] has no controller addresses"
                )));
            }
        }

        Ok(())
    }

    /// Target polling interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.collector.interval_secs)
    }
}
