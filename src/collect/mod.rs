//! Collection tasks.
//!
//! One submodule per collector kind:
//! - `metrics`: per-array performance counters (disks, systems, volumes)
//! - `events`: incremental event-log synchronization
//! - `failures`: failure-state deduplication
//!
//! Every task receives already-constructed collaborators through
//! `CollectionContext` rather than building its own clients per invocation,
//! and returns `AppResult<()>`; the fan-out executor logs failures so that no
//! task error can reach the scheduler loop.

use std::sync::Arc;

use tracing::debug;

use crate::config::CollectorConfig;
use crate::error::AppResult;
use crate::point::CollectionBatch;
use crate::proxy::ProxyApi;
use crate::store::PointStore;

pub mod events;
pub mod failures;
pub mod metrics;

/// Shared collaborators handed to every collection task.
#[derive(Clone)]
pub struct CollectionContext {
    /// Upstream management proxy accessor.
    pub proxy: Arc<dyn ProxyApi>,
    /// Time-series store accessor.
    pub store: Arc<dyn PointStore>,
    /// Collector configuration (intervals, toggles, dry-run).
    pub config: CollectorConfig,
}

impl CollectionContext {
    /// Bundle collaborators and configuration.
    pub fn new(
        proxy: Arc<dyn ProxyApi>,
        store: Arc<dyn PointStore>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            proxy,
            store,
            config,
        }
    }

    /// Write a batch unless dry-run is active.
    ///
    /// Dry-run performs all collection and transformation but skips the final
    /// store write for every collector kind.
    pub(crate) async fn write_batch(&self, batch: &CollectionBatch) -> AppResult<()> {
        if self.config.collector.dry_run {
            debug!(
                array = %batch.array_id,
                points = batch.len(),
                "dry-run: skipping store write"
            );
            return Ok(());
        }
        self.store.write_batch(batch).await
    }
}
