//! CLI entry point for the E-Series collector daemon.
//!
//! Startup sequence:
//! 1. Parse CLI flags, load configuration (TOML + environment), apply CLI
//!    overrides, and initialize tracing. A malformed configuration file is
//!    logged and the process continues with defaults.
//! 2. Ensure the store database exists (non-fatal if the store is down; the
//!    first write retries naturally).
//! 3. Wait for the web services proxy within the startup grace period; an
//!    unreachable proxy after the grace period is fatal.
//! 4. Register each configured array with the proxy; a failed registration
//!    is logged and skipped.
//! 5. Run the polling loop forever.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info, warn};

use eseries_collector::collect::CollectionContext;
use eseries_collector::config::CollectorConfig;
use eseries_collector::proxy::{ProxyApi, ProxyClient, RegisterArrayRequest};
use eseries_collector::scheduler::Scheduler;
use eseries_collector::store::{InfluxStore, PointStore};
use eseries_collector::tracing_setup;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How long to wait for the proxy to come up before giving up.
const STARTUP_GRACE: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "eseries-collector")]
#[command(about = "Collects storage-array performance and event data into InfluxDB", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Username used to connect to the web services proxy
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Password for this user on the web services proxy
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Polling interval in seconds
    #[arg(short = 't', long = "interval")]
    interval_secs: Option<u64>,

    /// Socket address (host or host:port) of the web services proxy
    #[arg(long)]
    proxy_address: Option<String>,

    /// Worker pool size for per-array fan-out
    #[arg(long)]
    workers: Option<usize>,

    /// Output the storage array names found on the proxy
    #[arg(short = 's', long)]
    show_array_names: bool,

    /// Output the drive names found on each storage array
    #[arg(short = 'd', long)]
    show_drive_names: bool,

    /// Output the volume names found on each storage array
    #[arg(short = 'v', long)]
    show_volume_names: bool,

    /// Output drive payloads before they are written
    #[arg(short = 'b', long)]
    show_drive_metrics: bool,

    /// Output system payloads before they are written
    #[arg(short = 'c', long)]
    show_system_metrics: bool,

    /// Output volume payloads before they are written
    #[arg(short = 'a', long)]
    show_volume_metrics: bool,

    /// Output event-log payloads before they are written
    #[arg(short = 'm', long)]
    show_event_metrics: bool,

    /// Output failure payloads before they are written
    #[arg(short = 'e', long)]
    show_failure_metrics: bool,

    /// Output the current loop iteration after every tick
    #[arg(short = 'i', long)]
    show_iteration: bool,

    /// Pull information but do not write anything to the store
    #[arg(short = 'n', long)]
    dry_run: bool,
}

impl Cli {
    /// Apply CLI overrides on top of the merged file/env configuration.
    fn apply(&self, config: &mut CollectorConfig) {
        if let Some(username) = &self.username {
            config.proxy.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.proxy.password = password.clone();
        }
        if let Some(address) = &self.proxy_address {
            config.proxy.address = address.clone();
        }
        if let Some(interval) = self.interval_secs {
            config.collector.interval_secs = interval;
        }
        if let Some(workers) = self.workers {
            config.collector.workers = workers;
        }
        config.collector.dry_run |= self.dry_run;
        config.logging.show_array_names |= self.show_array_names;
        config.logging.show_drive_names |= self.show_drive_names;
        config.logging.show_volume_names |= self.show_volume_names;
        config.logging.show_drive_metrics |= self.show_drive_metrics;
        config.logging.show_system_metrics |= self.show_system_metrics;
        config.logging.show_volume_metrics |= self.show_volume_metrics;
        config.logging.show_event_metrics |= self.show_event_metrics;
        config.logging.show_failure_metrics |= self.show_failure_metrics;
        config.logging.show_iteration |= self.show_iteration;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli);
    cli.apply(&mut config);
    if let Err(err) = config.validate() {
        return Err(anyhow!("invalid configuration: {err}"));
    }
    tracing_setup::init_from_config(&config).map_err(|msg| anyhow!(msg))?;

    info!(
        interval_secs = config.collector.interval_secs,
        workers = config.collector.workers,
        dry_run = config.collector.dry_run,
        "starting eseries-collector"
    );

    let proxy = Arc::new(ProxyClient::new(&config.proxy)?);
    let store = Arc::new(InfluxStore::new(&config.store)?);

    if let Err(err) = store.ensure_database().await {
        warn!(%err, "could not create the store database; writes will retry naturally");
    }

    // Fatal when the proxy stays unreachable past the grace period.
    proxy.wait_until_ready(STARTUP_GRACE).await?;

    register_configured_arrays(proxy.as_ref(), &config).await;

    let ctx = CollectionContext::new(proxy, store, config);
    Scheduler::new(ctx).run().await;
    Ok(())
}

/// Load configuration, degrading to defaults when the file is unusable.
fn load_config(cli: &Cli) -> CollectorConfig {
    let result = match &cli.config {
        Some(path) => CollectorConfig::load_from(path),
        None => CollectorConfig::load(),
    };
    match result {
        Ok(config) => config,
        Err(err) => {
            // Tracing is not initialized yet at this point.
            eprintln!("failed to load configuration, continuing with defaults: {err}");
            CollectorConfig::default()
        }
    }
}

/// Register every `[[arrays]]` entry with the proxy; failures skip the entry.
async fn register_configured_arrays(proxy: &dyn ProxyApi, config: &CollectorConfig) {
    for array in &config.arrays {
        info!(addresses = ?array.addresses, "registering configured array");
        let request = RegisterArrayRequest {
            controller_addresses: array.addresses.clone(),
            password: array
                .password
                .clone()
                .or_else(|| config.array_password.clone()),
            accept_certificate: true,
        };
        if let Err(err) = proxy.register_array(&request).await {
            error!(addresses = ?array.addresses, %err, "failed to register configured array");
        }
    }
}
