//! Failure-state deduplication.
//!
//! Realizes a monotone "observed-once" set: each identity tuple (failure
//! type, object reference, object type) is written to the store at most once
//! per array, no matter how many ticks continue to observe it. The diff runs
//! against everything previously stored for the array, with no time bound;
//! failures that disappear upstream are not retracted, they simply stop being
//! re-affirmed.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info};

use crate::collect::CollectionContext;
use crate::error::AppResult;
use crate::point::{CollectionBatch, FailureKey, FailureRecord, StorageArray};
use crate::proxy::FailureSummary;

/// Detect and write newly observed failures for one array.
pub async fn collect(ctx: &CollectionContext, array: &StorageArray) -> AppResult<()> {
    let current = ctx.proxy.current_failures(&array.id).await?;
    let known = ctx.store.failure_keys(&array.id).await?;

    let observed_at = Utc::now();
    let mut batch = CollectionBatch::new(array.id.clone());
    for key in new_failure_keys(current, &known) {
        let record = FailureRecord { key, observed_at };
        if ctx.config.logging.show_failure_metrics {
            debug!(array = %array.display_name(), payload = ?record, "failure payload");
        }
        batch.push(record.into_point(array));
    }

    if batch.is_empty() {
        return Ok(());
    }
    info!(
        array = %array.display_name(),
        count = batch.len(),
        "found new failures"
    );
    ctx.write_batch(&batch).await
}

/// Identity tuples present upstream but not yet recorded in the store.
///
/// Also deduplicates within the current tick, so one upstream list can never
/// produce the same tuple twice in a single batch.
pub fn new_failure_keys(
    current: Vec<FailureSummary>,
    known: &HashSet<FailureKey>,
) -> Vec<FailureKey> {
    let mut seen: HashSet<FailureKey> = HashSet::new();
    let mut fresh = Vec::new();
    for key in current.into_iter().map(FailureKey::from) {
        if known.contains(&key) || !seen.insert(key.clone()) {
            continue;
        }
        fresh.push(key);
    }
    fresh
}
