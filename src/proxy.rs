//! Upstream client for the storage-array web services proxy.
//!
//! The proxy exposes one management endpoint per array under
//! `http://{address}/devmgr/v2/storage-systems`. This module defines:
//!
//! - `ProxyApi`: the trait seam the collectors consume. Tests substitute an
//!   in-memory implementation behind the same trait.
//! - `ProxyClient`: the reqwest-backed implementation, with basic auth from
//!   configuration and tolerance for the proxy's self-signed certificates.
//! - The response DTOs. Performance statistics are deliberately loose-typed
//!   (`serde_json` maps) because metric fields are opaque pass-through
//!   key/value pairs; the collectors pick named fields out of them.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::{AppResult, CollectorError};
use crate::point::{FailureKey, StorageArray};

/// Opaque statistics object keyed by upstream metric names.
pub type StatsObject = serde_json::Map<String, serde_json::Value>;

/// One entry in the proxy's array list.
#[derive(Clone, Debug, Deserialize)]
pub struct ArraySummary {
    /// Unique array identifier.
    pub id: String,
    /// Display name; may be absent or empty.
    #[serde(default)]
    pub name: Option<String>,
}

impl From<ArraySummary> for StorageArray {
    fn from(value: ArraySummary) -> Self {
        StorageArray {
            id: value.id,
            name: value.name,
        }
    }
}

/// Tray entry from the hardware inventory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraySummary {
    /// Opaque tray reference, joined against drive locations.
    pub tray_ref: String,
    /// Numeric tray id used for tagging.
    pub tray_id: i64,
}

/// Physical location of a drive.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalLocation {
    /// Tray the drive sits in, as an opaque reference.
    pub tray_ref: String,
    /// Slot within the tray.
    pub slot: i64,
}

/// Drive entry from the hardware inventory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveSummary {
    /// Opaque drive reference, joined against drive statistics.
    pub drive_ref: String,
    /// Where the drive physically sits.
    pub physical_location: PhysicalLocation,
}

/// Hardware inventory listing used to resolve drive locations.
#[derive(Clone, Debug, Deserialize)]
pub struct HardwareInventory {
    /// All trays in the array.
    #[serde(default)]
    pub trays: Vec<TraySummary>,
    /// All drives in the array.
    #[serde(default)]
    pub drives: Vec<DriveSummary>,
}

/// Per-drive analysed statistics: the drive reference plus opaque metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveStats {
    /// Drive reference this record belongs to.
    pub disk_id: String,
    /// Opaque metric map.
    #[serde(flatten)]
    pub metrics: StatsObject,
}

/// Per-volume analysed statistics: the volume name plus opaque metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStats {
    /// Volume name this record belongs to.
    pub volume_name: String,
    /// Opaque metric map.
    #[serde(flatten)]
    pub metrics: StatsObject,
}

/// Epoch-seconds timestamp as the proxy sends it (string or number).
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    /// Numeric form.
    Number(i64),
    /// String form, e.g. `"1700000000"`.
    Text(String),
}

impl EpochSeconds {
    /// Parse into seconds since the epoch, if well-formed.
    pub fn as_secs(&self) -> Option<i64> {
        match self {
            EpochSeconds::Number(n) => Some(*n),
            EpochSeconds::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Raw form for tagging, exactly as sent upstream.
    pub fn raw(&self) -> String {
        match self {
            EpochSeconds::Number(n) => n.to_string(),
            EpochSeconds::Text(s) => s.clone(),
        }
    }
}

/// One major-event-log record from the proxy.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MelEvent {
    /// Upstream-assigned monotone sequence id.
    pub id: i64,
    /// Event classification.
    #[serde(default)]
    pub event_type: String,
    /// Epoch-seconds timestamp.
    pub time_stamp: EpochSeconds,
    /// Event category.
    #[serde(default)]
    pub category: String,
    /// Event priority.
    #[serde(default)]
    pub priority: String,
    /// Criticality marker.
    #[serde(default)]
    pub critical: bool,
    /// Additional sense code.
    #[serde(default)]
    pub asc: String,
    /// Additional sense code qualifier.
    #[serde(default)]
    pub ascq: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Component location string.
    #[serde(default)]
    pub location: String,
}

/// One current failure from the proxy.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    /// Failure classification.
    pub failure_type: String,
    /// Reference to the failing object.
    pub object_ref: String,
    /// Type of the failing object.
    pub object_type: String,
}

impl From<FailureSummary> for FailureKey {
    fn from(value: FailureSummary) -> Self {
        FailureKey {
            failure_type: value.failure_type,
            object_ref: value.object_ref,
            object_type: value.object_type,
        }
    }
}

/// Registration request submitted for each configured array at startup.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterArrayRequest {
    /// Controller addresses for the array.
    pub controller_addresses: Vec<String>,
    /// Array password, if any.
    pub password: Option<String>,
    /// Accept the array's certificate without verification.
    pub accept_certificate: bool,
}

/// Request/response accessor for the web services proxy.
///
/// Synchronous from a worker's perspective: each call awaits the full
/// round-trip. A slow call occupies one fan-out slot without blocking others.
#[async_trait]
pub trait ProxyApi: Send + Sync {
    /// List all arrays known to the proxy.
    async fn list_arrays(&self) -> AppResult<Vec<StorageArray>>;

    /// Fetch the hardware inventory for an array.
    async fn hardware_inventory(&self, array_id: &str) -> AppResult<HardwareInventory>;

    /// Fetch analysed per-drive statistics for an array.
    async fn analysed_drive_statistics(&self, array_id: &str) -> AppResult<Vec<DriveStats>>;

    /// Fetch analysed array-wide statistics for an array.
    async fn analysed_system_statistics(&self, array_id: &str) -> AppResult<StatsObject>;

    /// Fetch analysed per-volume statistics for an array.
    async fn analysed_volume_statistics(&self, array_id: &str) -> AppResult<Vec<VolumeStats>>;

    /// Fetch one page of event-log records at or after `start_sequence`.
    ///
    /// `start_sequence = -1` means "all available history".
    async fn event_log_page(
        &self,
        array_id: &str,
        start_sequence: i64,
        count: u32,
    ) -> AppResult<Vec<MelEvent>>;

    /// Fetch the current failure list for an array.
    async fn current_failures(&self, array_id: &str) -> AppResult<Vec<FailureSummary>>;

    /// Register an array with the proxy (startup only).
    async fn register_array(&self, request: &RegisterArrayRequest) -> AppResult<()>;
}

/// Client-type identifier the proxy records for each session.
const CLIENT_TYPE: &str = concat!("grafana-", env!("CARGO_PKG_VERSION"));

/// reqwest-backed `ProxyApi` implementation.
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ProxyClient {
    /// Build a client from proxy configuration.
    pub fn new(config: &ProxyConfig) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("netapp-client-type"),
            HeaderValue::from_static(CLIENT_TYPE),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("eseries-collector/", env!("CARGO_PKG_VERSION")))
            // The proxy commonly runs with a self-signed certificate.
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("http://{}/devmgr/v2/storage-systems", config.address),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Base URL of the storage-systems endpoint.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Block startup until the proxy answers, within a grace period.
    ///
    /// Retries every few seconds; returns the last error once the grace
    /// period is exhausted. This is the only fatal startup path besides
    /// process signals.
    pub async fn wait_until_ready(&self, grace: Duration) -> AppResult<()> {
        let deadline = Instant::now() + grace;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.list_arrays().await {
                Ok(arrays) => {
                    debug!(arrays = arrays.len(), attempt, "proxy is reachable");
                    return Ok(());
                }
                Err(err) if Instant::now() < deadline => {
                    warn!(%err, attempt, "proxy not ready yet, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: String,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::upstream(operation, status.as_u16()));
        }
        Ok(response.json().await?)
    }

    fn array_url(&self, array_id: &str, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, array_id, endpoint)
    }
}

#[async_trait]
impl ProxyApi for ProxyClient {
    async fn list_arrays(&self) -> AppResult<Vec<StorageArray>> {
        let summaries: Vec<ArraySummary> = self
            .get_json("storage-systems", self.base_url.clone(), &[])
            .await?;
        Ok(summaries.into_iter().map(StorageArray::from).collect())
    }

    async fn hardware_inventory(&self, array_id: &str) -> AppResult<HardwareInventory> {
        self.get_json(
            "hardware-inventory",
            self.array_url(array_id, "hardware-inventory"),
            &[],
        )
        .await
    }

    async fn analysed_drive_statistics(&self, array_id: &str) -> AppResult<Vec<DriveStats>> {
        self.get_json(
            "analysed-drive-statistics",
            self.array_url(array_id, "analysed-drive-statistics"),
            &[],
        )
        .await
    }

    async fn analysed_system_statistics(&self, array_id: &str) -> AppResult<StatsObject> {
        self.get_json(
            "analysed-system-statistics",
            self.array_url(array_id, "analysed-system-statistics"),
            &[],
        )
        .await
    }

    async fn analysed_volume_statistics(&self, array_id: &str) -> AppResult<Vec<VolumeStats>> {
        self.get_json(
            "analysed-volume-statistics",
            self.array_url(array_id, "analysed-volume-statistics"),
            &[],
        )
        .await
    }

    async fn event_log_page(
        &self,
        array_id: &str,
        start_sequence: i64,
        count: u32,
    ) -> AppResult<Vec<MelEvent>> {
        self.get_json(
            "mel-events",
            self.array_url(array_id, "mel-events"),
            &[
                ("count", count.to_string()),
                ("startSequenceNumber", start_sequence.to_string()),
            ],
        )
        .await
    }

    async fn current_failures(&self, array_id: &str) -> AppResult<Vec<FailureSummary>> {
        self.get_json("failures", self.array_url(array_id, "failures"), &[])
            .await
    }

    async fn register_array(&self, request: &RegisterArrayRequest) -> AppResult<()> {
        let response = self
            .http
            .post(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::upstream("register", status.as_u16()));
        }
        Ok(())
    }
}
