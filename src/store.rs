//! Time-series store client.
//!
//! The write path speaks the InfluxDB v1 line protocol over HTTP; the read
//! path issues the two InfluxQL queries the collectors need to reconstruct
//! their state after a restart:
//!
//! - the maximum stored event sequence id per array (the high-water-mark),
//! - the set of failure identity tuples already recorded per array.
//!
//! The `PointStore` trait is the seam the collectors consume; `InfluxStore`
//! is the HTTP implementation. The core never depends on a batch write being
//! transactional, only on a successful call having persisted all its points.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write as _;

use crate::config::StoreConfig;
use crate::error::{AppResult, CollectorError};
use crate::point::{CollectionBatch, FailureKey, FieldValue, MetricPoint};

/// Write/read contract against the time-series store.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Persist a batch of points. A successful call persists every point.
    async fn write_batch(&self, batch: &CollectionBatch) -> AppResult<()>;

    /// Maximum stored event sequence id for an array, if any.
    async fn max_event_id(&self, array_id: &str) -> AppResult<Option<i64>>;

    /// All failure identity tuples previously recorded for an array.
    async fn failure_keys(&self, array_id: &str) -> AppResult<HashSet<FailureKey>>;

    /// Create the backing database if it does not exist (startup only).
    async fn ensure_database(&self) -> AppResult<()>;
}

/// InfluxDB v1 HTTP implementation of `PointStore`.
pub struct InfluxStore {
    http: reqwest::Client,
    url: String,
    database: String,
}

impl InfluxStore {
    /// Build a store client from configuration.
    pub fn new(config: &StoreConfig) -> AppResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .user_agent(concat!("eseries-collector/", env!("CARGO_PKG_VERSION")))
                .build()?,
            url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
        })
    }

    async fn query(&self, q: &str) -> AppResult<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/query", self.url))
            .query(&[("db", self.database.as_str()), ("q", q)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollectorError::store(
                "query",
                format!("status {status}: {detail}"),
            ));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PointStore for InfluxStore {
    async fn write_batch(&self, batch: &CollectionBatch) -> AppResult<()> {
        let body = encode_batch(batch);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(format!("{}/write", self.url))
            .query(&[
                ("db", self.database.as_str()),
                ("precision", "s"),
            ])
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollectorError::store(
                "write",
                format!("status {status}: {detail}"),
            ));
        }
        Ok(())
    }

    async fn max_event_id(&self, array_id: &str) -> AppResult<Option<i64>> {
        let q = format!(
            "SELECT max(\"id\") FROM \"major_event_log\" WHERE \"sys_id\" = '{}'",
            escape_string_literal(array_id)
        );
        let body = self.query(&q).await?;
        Ok(parse_single_value(&body))
    }

    async fn failure_keys(&self, array_id: &str) -> AppResult<HashSet<FailureKey>> {
        let q = format!(
            "SELECT * FROM \"failures\" WHERE \"sys_id\" = '{}'",
            escape_string_literal(array_id)
        );
        let body = self.query(&q).await?;
        Ok(parse_failure_keys(&body))
    }

    async fn ensure_database(&self) -> AppResult<()> {
        let response = self
            .http
            .post(format!("{}/query", self.url))
            .form(&[("q", format!("CREATE DATABASE \"{}\"", self.database))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollectorError::store(
                "create_database",
                format!("status {status}: {detail}"),
            ));
        }
        Ok(())
    }
}

/// Encode a batch as line protocol, one line per point.
///
/// `Null` fields are skipped (the wire cannot express them); points whose
/// fields are all `Null` are skipped entirely since the wire requires at
/// least one field per point.
pub fn encode_batch(batch: &CollectionBatch) -> String {
    let mut out = String::new();
    for point in &batch.points {
        if point.all_fields_null() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        encode_point(&mut out, point);
    }
    out
}

fn encode_point(out: &mut String, point: &MetricPoint) {
    out.push_str(&escape_measurement(point.measurement.as_str()));
    for (key, value) in &point.tags {
        // The wire rejects empty tag values; such tags are omitted.
        if value.is_empty() {
            continue;
        }
        let _ = write!(out, ",{}={}", escape_tag(key), escape_tag(value));
    }

    let mut first = true;
    for (key, value) in &point.fields {
        let encoded = match value {
            FieldValue::Float(f) => format!("{f}"),
            FieldValue::Integer(i) => format!("{i}i"),
            FieldValue::Boolean(b) => format!("{b}"),
            FieldValue::Text(s) => format!("\"{}\"", escape_field_string(s)),
            FieldValue::Null => continue,
        };
        let separator = if first { ' ' } else { ',' };
        let _ = write!(out, "{}{}={}", separator, escape_tag(key), encoded);
        first = false;
    }

    if let Some(timestamp) = point.timestamp {
        let _ = write!(out, " {}", timestamp.timestamp());
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_field_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_string_literal(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// Pull the scalar out of a single-row, single-aggregate query response.
fn parse_single_value(body: &serde_json::Value) -> Option<i64> {
    let value = body
        .get("results")?
        .get(0)?
        .get("series")?
        .get(0)?
        .get("values")?
        .get(0)?
        .get(1)?;
    if let Some(i) = value.as_i64() {
        Some(i)
    } else {
        value.as_f64().map(|f| f as i64)
    }
}

/// Pull failure identity tuples out of a `SELECT * FROM "failures"` response.
///
/// Tags come back as ordinary columns in InfluxQL results; rows missing any
/// of the three identity columns are ignored.
fn parse_failure_keys(body: &serde_json::Value) -> HashSet<FailureKey> {
    let mut keys = HashSet::new();

    let series = body
        .get("results")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("series"))
        .and_then(|s| s.as_array());
    let Some(series) = series else {
        return keys;
    };

    for entry in series {
        let Some(columns) = entry.get("columns").and_then(|c| c.as_array()) else {
            continue;
        };
        let index_of = |name: &str| columns.iter().position(|c| c.as_str() == Some(name));
        let (Some(type_idx), Some(ref_idx), Some(obj_idx)) = (
            index_of("failure_type"),
            index_of("object_ref"),
            index_of("object_type"),
        ) else {
            continue;
        };

        let Some(values) = entry.get("values").and_then(|v| v.as_array()) else {
            continue;
        };
        for row in values {
            let field = |idx: usize| {
                row.get(idx)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            };
            if let (Some(failure_type), Some(object_ref), Some(object_type)) =
                (field(type_idx), field(ref_idx), field(obj_idx))
            {
                keys.insert(FailureKey {
                    failure_type,
                    object_ref,
                    object_type,
                });
            }
        }
    }

    keys
}
