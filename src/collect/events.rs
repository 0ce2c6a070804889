//! Incremental event-log synchronization.
//!
//! The synchronizer tracks a per-array high-water-mark in the store itself:
//! at the start of each task it queries the maximum stored sequence id and
//! asks the proxy only for events at or after `max + 1`. With no prior state
//! it uses the "from beginning" sentinel. Because the mark only advances by
//! what was actually stored, backlog beyond the per-request ceiling is picked
//! up on subsequent ticks, and a restart never skips or duplicates records.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::collect::CollectionContext;
use crate::error::AppResult;
use crate::point::{CollectionBatch, EventLogRecord, StorageArray};
use crate::proxy::MelEvent;

/// Maximum events requested (and therefore written) per tick. Bounds the
/// single-request and single-write payload size after accumulated downtime.
pub const EVENT_BATCH_CEILING: u32 = 8192;

/// Sequence id sentinel meaning "all available history".
pub const FROM_BEGINNING: i64 = -1;

/// Synchronize new event-log records for one array.
pub async fn collect(ctx: &CollectionContext, array: &StorageArray) -> AppResult<()> {
    let start = next_start_sequence(ctx.store.max_event_id(&array.id).await?);
    let events = ctx
        .proxy
        .event_log_page(&array.id, start, EVENT_BATCH_CEILING)
        .await?;

    if ctx.config.logging.show_event_metrics {
        debug!(
            array = %array.display_name(),
            start,
            count = events.len(),
            "grabbing event-log records"
        );
    }

    let mut batch = CollectionBatch::new(array.id.clone());
    for event in events {
        let record = record_from_event(event, array);
        if ctx.config.logging.show_event_metrics {
            debug!(array = %array.display_name(), payload = ?record, "event payload");
        }
        batch.push(record.into_point(array));
    }

    if batch.is_empty() {
        return Ok(());
    }
    ctx.write_batch(&batch).await
}

/// Starting sequence id for the next upstream request.
///
/// With a stored maximum of `K` the next request starts at `K + 1`; ids are
/// append-only and never revised, so nothing below that can be new. With no
/// prior state, start from the beginning.
pub fn next_start_sequence(stored_max: Option<i64>) -> i64 {
    match stored_max {
        Some(max) => max + 1,
        None => FROM_BEGINNING,
    }
}

/// Shape one upstream event into a typed record.
///
/// An unparseable epoch timestamp degrades to "now" with a warning rather
/// than aborting the batch.
pub fn record_from_event(event: MelEvent, array: &StorageArray) -> EventLogRecord {
    let timestamp = event
        .time_stamp
        .as_secs()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    let timestamp = match timestamp {
        Some(ts) => ts,
        None => {
            warn!(
                array = %array.display_name(),
                sequence = event.id,
                raw = %event.time_stamp.raw(),
                "event timestamp is not valid epoch seconds; using current time"
            );
            Utc::now()
        }
    };

    EventLogRecord {
        sequence: event.id,
        event_type: event.event_type,
        raw_timestamp: event.time_stamp.raw(),
        category: event.category,
        priority: event.priority,
        critical: event.critical,
        asc: event.asc,
        ascq: event.ascq,
        description: event.description,
        location: event.location,
        timestamp,
    }
}

/// Timestamp helper exposed for tests: epoch seconds to UTC.
pub fn timestamp_from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
