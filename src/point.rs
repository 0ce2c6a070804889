//! Core data model for collected points.
//!
//! Everything the collectors build is transient: constructed fresh each tick
//! from upstream reads and store reads, handed to the store for persistence,
//! and dropped. The store is the single source of truth between ticks.
//!
//! Key types:
//! - `Measurement`: the fixed set of measurement categories on the wire
//! - `MetricPoint`: one tagged, timestamped point with named field values
//! - `EventLogRecord` / `FailureRecord`: typed records that convert to points
//! - `CollectionBatch`: per-array, per-collector batch for a single write call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display name used when an array reports neither a name nor an id.
pub const DEFAULT_ARRAY_NAME: &str = "unnamed";

/// Per-disk metric names collected from analysed drive statistics.
pub const DRIVE_METRICS: [&str; 16] = [
    "averageReadOpSize",
    "averageWriteOpSize",
    "combinedIOps",
    "combinedResponseTime",
    "combinedThroughput",
    "otherIOps",
    "readIOps",
    "readOps",
    "readPhysicalIOps",
    "readResponseTime",
    "readThroughput",
    "writeIOps",
    "writeOps",
    "writePhysicalIOps",
    "writeResponseTime",
    "writeThroughput",
];

/// Per-array metric names collected from analysed system statistics.
pub const SYSTEM_METRICS: [&str; 2] = ["maxCpuUtilization", "cpuAvgUtilization"];

/// Per-volume metric names collected from analysed volume statistics.
pub const VOLUME_METRICS: [&str; 29] = [
    "averageReadOpSize",
    "averageWriteOpSize",
    "combinedIOps",
    "combinedResponseTime",
    "combinedThroughput",
    "flashCacheHitPct",
    "flashCacheReadHitBytes",
    "flashCacheReadHitOps",
    "flashCacheReadResponseTime",
    "flashCacheReadThroughput",
    "otherIOps",
    "queueDepthMax",
    "queueDepthTotal",
    "readCacheUtilization",
    "readHitBytes",
    "readHitOps",
    "readIOps",
    "readOps",
    "readPhysicalIOps",
    "readResponseTime",
    "readThroughput",
    "writeCacheUtilization",
    "writeHitBytes",
    "writeHitOps",
    "writeIOps",
    "writeOps",
    "writePhysicalIOps",
    "writeResponseTime",
    "writeThroughput",
];

/// Field names carried on each event-log point.
pub const EVENT_FIELDS: [&str; 3] = ["id", "description", "location"];

/// Measurement categories written to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Measurement {
    /// Per-disk performance counters.
    Disks,
    /// Per-array performance counters.
    Systems,
    /// Per-volume performance counters.
    Volumes,
    /// Major event log records.
    MajorEventLog,
    /// Failure state records.
    Failures,
}

impl Measurement {
    /// Stable wire name of the measurement.
    pub fn as_str(&self) -> &'static str {
        match self {
            Measurement::Disks => "disks",
            Measurement::Systems => "systems",
            Measurement::Volumes => "volumes",
            Measurement::MajorEventLog => "major_event_log",
            Measurement::Failures => "failures",
        }
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field value on a point.
///
/// Upstream statistics are opaque key/value pairs; values the upstream omits
/// (or sends in a shape the wire cannot carry) are represented as `Null`
/// rather than dropped, so every point carries the full field set for its
/// measurement category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Floating-point counter value.
    Float(f64),
    /// Integer counter or sequence id.
    Integer(i64),
    /// Boolean marker field.
    Boolean(bool),
    /// Free-text payload, e.g. an event description.
    Text(String),
    /// Value absent upstream.
    Null,
}

impl FieldValue {
    /// Whether this value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Null
                }
            }
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b),
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            _ => FieldValue::Null,
        }
    }
}

/// Pick the named fields out of an opaque upstream object.
///
/// Every name in `names` appears in the result; names the source omits map to
/// `FieldValue::Null`.
pub fn pick_fields(
    source: &serde_json::Map<String, serde_json::Value>,
    names: &[&str],
) -> BTreeMap<String, FieldValue> {
    names
        .iter()
        .map(|name| {
            let value = source.get(*name).map(FieldValue::from).unwrap_or(FieldValue::Null);
            ((*name).to_string(), value)
        })
        .collect()
}

/// One storage array as discovered from the proxy's array list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageArray {
    /// Opaque unique identifier assigned by the proxy.
    pub id: String,
    /// Optional display name; may be empty upstream.
    pub name: Option<String>,
}

impl StorageArray {
    /// Display name with fallback: name, then id, then a fixed default.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.id.is_empty() => &self.id,
            _ => DEFAULT_ARRAY_NAME,
        }
    }
}

/// A single tagged, timestamped point destined for the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Measurement category.
    pub measurement: Measurement,
    /// Identifying dimensions (array id/name, tray/slot, volume name, ...).
    pub tags: BTreeMap<String, String>,
    /// Named counter values; `Null` where the source omitted the value.
    pub fields: BTreeMap<String, FieldValue>,
    /// Explicit timestamp; `None` means "now" at write time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricPoint {
    /// Start an empty point for a measurement.
    pub fn new(measurement: Measurement) -> Self {
        Self {
            measurement,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set the explicit timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether every field on this point is `Null`.
    ///
    /// The wire format requires at least one concrete field per point, so the
    /// store skips all-null points.
    pub fn all_fields_null(&self) -> bool {
        self.fields.values().all(FieldValue::is_null)
    }
}

/// One event-log record as synchronized from the upstream event log.
///
/// The sequence id is assigned upstream, unique and monotonically increasing
/// per array; the collector never generates or revises it.
#[derive(Clone, Debug)]
pub struct EventLogRecord {
    /// Upstream-assigned monotone sequence id.
    pub sequence: i64,
    /// Event classification, e.g. `mediaError`.
    pub event_type: String,
    /// Raw epoch-seconds timestamp as sent upstream.
    pub raw_timestamp: String,
    /// Event category.
    pub category: String,
    /// Event priority.
    pub priority: String,
    /// Criticality marker.
    pub critical: bool,
    /// Additional sense code.
    pub asc: String,
    /// Additional sense code qualifier.
    pub ascq: String,
    /// Human-readable description.
    pub description: String,
    /// Component location string.
    pub location: String,
    /// Timestamp derived from the epoch-seconds field.
    pub timestamp: DateTime<Utc>,
}

impl EventLogRecord {
    /// Convert into a `major_event_log` point for the owning array.
    pub fn into_point(self, array: &StorageArray) -> MetricPoint {
        MetricPoint::new(Measurement::MajorEventLog)
            .tag("sys_id", array.id.clone())
            .tag("sys_name", array.display_name())
            .tag("event_type", self.event_type)
            .tag("time_stamp", self.raw_timestamp)
            .tag("category", self.category)
            .tag("priority", self.priority)
            .tag("critical", self.critical.to_string())
            .tag("asc", self.asc)
            .tag("ascq", self.ascq)
            .field("id", FieldValue::Integer(self.sequence))
            .field("description", FieldValue::Text(self.description))
            .field("location", FieldValue::Text(self.location))
            .at(self.timestamp)
    }
}

/// Identity tuple that uniquely identifies a failure occurrence together with
/// its owning array.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureKey {
    /// Failure classification, e.g. `drive`.
    pub failure_type: String,
    /// Reference to the failing object.
    pub object_ref: String,
    /// Type of the failing object, e.g. `disk`.
    pub object_type: String,
}

/// One newly observed failure, written to the store at most once.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    /// Identity tuple for dedup.
    pub key: FailureKey,
    /// Timestamp of first observation.
    pub observed_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Convert into a `failures` point for the owning array.
    pub fn into_point(self, array: &StorageArray) -> MetricPoint {
        MetricPoint::new(Measurement::Failures)
            .tag("sys_id", array.id.clone())
            .tag("sys_name", array.display_name())
            .tag("failure_type", self.key.failure_type)
            .tag("object_ref", self.key.object_ref)
            .tag("object_type", self.key.object_type)
            .field("value", FieldValue::Boolean(true))
            .at(self.observed_at)
    }
}

/// An ordered batch of points for a single write call.
///
/// Batches are per-array and per-collector-kind; they are never merged across
/// arrays.
#[derive(Clone, Debug, Default)]
pub struct CollectionBatch {
    /// Owning array id.
    pub array_id: String,
    /// Points in collection order.
    pub points: Vec<MetricPoint>,
}

impl CollectionBatch {
    /// Start an empty batch for an array.
    pub fn new(array_id: impl Into<String>) -> Self {
        Self {
            array_id: array_id.into(),
            points: Vec::new(),
        }
    }

    /// Append a point.
    pub fn push(&mut self, point: MetricPoint) {
        self.points.push(point);
    }

    /// Number of points in the batch.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the batch carries no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
