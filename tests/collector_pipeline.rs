//! Collection pipeline integration tests.
//!
//! End-to-end scenarios for the collection engine against in-memory
//! `ProxyApi` and `PointStore` implementations:
//!
//! - event-log synchronization advances the per-array high-water-mark
//! - failure-state collection is idempotent across ticks
//! - system metrics produce the exact expected point counts and field sets
//! - one array's failure never blocks collection for another
//! - the three collector phases run strictly in order
//! - dry-run performs collection but writes nothing

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use eseries_collector::collect::{events, failures, metrics, CollectionContext};
use eseries_collector::config::CollectorConfig;
use eseries_collector::error::{AppResult, CollectorError};
use eseries_collector::point::{
    CollectionBatch, FailureKey, FieldValue, Measurement, StorageArray, DRIVE_METRICS,
    VOLUME_METRICS,
};
use eseries_collector::proxy::{
    DriveStats, DriveSummary, FailureSummary, HardwareInventory, MelEvent, PhysicalLocation,
    ProxyApi, RegisterArrayRequest, StatsObject, TraySummary, VolumeStats,
};
use eseries_collector::scheduler::FanOutExecutor;
use eseries_collector::store::PointStore;
use std::sync::Arc;
use tracing_test::traced_test;

// =============================================================================
// In-memory collaborators
// =============================================================================

/// Upstream state for one mocked array.
#[derive(Default, Clone)]
struct ArrayFixture {
    drives: Vec<DriveStats>,
    inventory: Option<HardwareInventory>,
    system: StatsObject,
    volumes: Vec<VolumeStats>,
    events: Vec<MelEvent>,
    failures: Vec<FailureSummary>,
    /// Simulate a broken upstream for this array.
    fail_requests: bool,
}

#[derive(Default)]
struct MockProxy {
    arrays: Vec<StorageArray>,
    fixtures: Mutex<std::collections::HashMap<String, ArrayFixture>>,
    /// `startSequenceNumber` values seen by the event-log endpoint.
    event_requests: Mutex<Vec<i64>>,
}

impl MockProxy {
    fn with_array(mut self, id: &str, fixture: ArrayFixture) -> Self {
        self.arrays.push(StorageArray {
            id: id.to_string(),
            name: Some(format!("{id}-name")),
        });
        self.fixtures
            .lock()
            .unwrap()
            .insert(id.to_string(), fixture);
        self
    }

    fn fixture(&self, array_id: &str) -> AppResult<ArrayFixture> {
        let fixtures = self.fixtures.lock().unwrap();
        let fixture = fixtures
            .get(array_id)
            .cloned()
            .ok_or_else(|| CollectorError::upstream("unknown-array", 404))?;
        if fixture.fail_requests {
            return Err(CollectorError::upstream("mock", 500));
        }
        Ok(fixture)
    }

    fn extend_events(&self, array_id: &str, events: Vec<MelEvent>) {
        self.fixtures
            .lock()
            .unwrap()
            .get_mut(array_id)
            .unwrap()
            .events
            .extend(events);
    }
}

#[async_trait]
impl ProxyApi for MockProxy {
    async fn list_arrays(&self) -> AppResult<Vec<StorageArray>> {
        Ok(self.arrays.clone())
    }

    async fn hardware_inventory(&self, array_id: &str) -> AppResult<HardwareInventory> {
        Ok(self
            .fixture(array_id)?
            .inventory
            .unwrap_or_else(|| HardwareInventory {
                trays: vec![],
                drives: vec![],
            }))
    }

    async fn analysed_drive_statistics(&self, array_id: &str) -> AppResult<Vec<DriveStats>> {
        Ok(self.fixture(array_id)?.drives)
    }

    async fn analysed_system_statistics(&self, array_id: &str) -> AppResult<StatsObject> {
        Ok(self.fixture(array_id)?.system)
    }

    async fn analysed_volume_statistics(&self, array_id: &str) -> AppResult<Vec<VolumeStats>> {
        Ok(self.fixture(array_id)?.volumes)
    }

    async fn event_log_page(
        &self,
        array_id: &str,
        start_sequence: i64,
        count: u32,
    ) -> AppResult<Vec<MelEvent>> {
        self.event_requests.lock().unwrap().push(start_sequence);
        let fixture = self.fixture(array_id)?;
        Ok(fixture
            .events
            .into_iter()
            .filter(|event| start_sequence < 0 || event.id >= start_sequence)
            .take(count as usize)
            .collect())
    }

    async fn current_failures(&self, array_id: &str) -> AppResult<Vec<FailureSummary>> {
        Ok(self.fixture(array_id)?.failures)
    }

    async fn register_array(&self, _request: &RegisterArrayRequest) -> AppResult<()> {
        Ok(())
    }
}

/// Store whose read paths are reconstructed from the batches written to it,
/// like the real store: the written data is the single source of truth.
#[derive(Default)]
struct MockStore {
    written: Mutex<Vec<CollectionBatch>>,
}

impl MockStore {
    fn written(&self) -> Vec<CollectionBatch> {
        self.written.lock().unwrap().clone()
    }

    fn points_for(&self, measurement: Measurement, array_id: &str) -> Vec<FieldValue> {
        self.written()
            .iter()
            .flat_map(|batch| batch.points.clone())
            .filter(|point| {
                point.measurement == measurement
                    && point.tags.get("sys_id").map(String::as_str) == Some(array_id)
            })
            .filter_map(|point| point.fields.get("id").cloned())
            .collect()
    }
}

#[async_trait]
impl PointStore for MockStore {
    async fn write_batch(&self, batch: &CollectionBatch) -> AppResult<()> {
        self.written.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn max_event_id(&self, array_id: &str) -> AppResult<Option<i64>> {
        let max = self
            .points_for(Measurement::MajorEventLog, array_id)
            .into_iter()
            .filter_map(|value| match value {
                FieldValue::Integer(i) => Some(i),
                _ => None,
            })
            .max();
        Ok(max)
    }

    async fn failure_keys(&self, array_id: &str) -> AppResult<HashSet<FailureKey>> {
        let keys = self
            .written()
            .iter()
            .flat_map(|batch| batch.points.clone())
            .filter(|point| {
                point.measurement == Measurement::Failures
                    && point.tags.get("sys_id").map(String::as_str) == Some(array_id)
            })
            .map(|point| FailureKey {
                failure_type: point.tags["failure_type"].clone(),
                object_ref: point.tags["object_ref"].clone(),
                object_type: point.tags["object_type"].clone(),
            })
            .collect();
        Ok(keys)
    }

    async fn ensure_database(&self) -> AppResult<()> {
        Ok(())
    }
}

// =============================================================================
// Fixture helpers
// =============================================================================

fn mel_event(id: i64) -> MelEvent {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "eventType": "mediaError",
        "timeStamp": "1700000000",
        "category": "error",
        "priority": "high",
        "critical": false,
        "asc": "0x0c",
        "ascq": "0x00",
        "description": format!("event {id}"),
        "location": "Tray 1",
    }))
    .unwrap()
}

fn drive_failure(object_ref: &str) -> FailureSummary {
    serde_json::from_value(serde_json::json!({
        "failureType": "drive",
        "objectRef": object_ref,
        "objectType": "disk",
    }))
    .unwrap()
}

fn drive_stats(disk_id: &str) -> DriveStats {
    serde_json::from_value(serde_json::json!({
        "diskId": disk_id,
        "readIOps": 100.0,
        "writeIOps": 50.0,
    }))
    .unwrap()
}

fn volume_stats(name: &str) -> VolumeStats {
    serde_json::from_value(serde_json::json!({
        "volumeName": name,
        "readIOps": 10.0,
    }))
    .unwrap()
}

fn array(id: &str) -> StorageArray {
    StorageArray {
        id: id.to_string(),
        name: Some(format!("{id}-name")),
    }
}

// =============================================================================
// Event log synchronization
// =============================================================================

#[tokio::test]
async fn event_sync_starts_from_sentinel_and_advances_high_water_mark() {
    let proxy = MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            events: vec![mel_event(10), mel_event(11), mel_event(12)],
            ..Default::default()
        },
    );
    let store = Arc::new(MockStore::default());
    let proxy = Arc::new(proxy);
    let ctx = CollectionContext::new(proxy.clone(), store.clone(), CollectorConfig::default());

    events::collect(&ctx, &array("A1")).await.unwrap();

    // First run: no prior state, sentinel request, three records stored.
    assert_eq!(proxy.event_requests.lock().unwrap().as_slice(), &[-1]);
    let stored: Vec<_> = store
        .points_for(Measurement::MajorEventLog, "A1")
        .into_iter()
        .collect();
    assert_eq!(
        stored,
        vec![
            FieldValue::Integer(10),
            FieldValue::Integer(11),
            FieldValue::Integer(12)
        ]
    );

    // Upstream now has 10..=15; only 13..=15 are new.
    proxy.extend_events("A1", vec![mel_event(13), mel_event(14), mel_event(15)]);
    events::collect(&ctx, &array("A1")).await.unwrap();

    assert_eq!(proxy.event_requests.lock().unwrap().as_slice(), &[-1, 13]);
    let stored = store.points_for(Measurement::MajorEventLog, "A1");
    assert_eq!(stored.len(), 6);
    assert_eq!(stored[3..], [
        FieldValue::Integer(13),
        FieldValue::Integer(14),
        FieldValue::Integer(15)
    ]);
}

#[tokio::test]
async fn event_sync_with_no_new_events_writes_nothing() {
    let proxy = Arc::new(MockProxy::default().with_array("A1", ArrayFixture::default()));
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy, store.clone(), CollectorConfig::default());

    events::collect(&ctx, &array("A1")).await.unwrap();
    assert!(store.written().is_empty());
}

// =============================================================================
// Failure-state deduplication
// =============================================================================

#[tokio::test]
async fn failure_collection_is_idempotent_across_ticks() {
    let proxy = Arc::new(MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            failures: vec![drive_failure("R1")],
            ..Default::default()
        },
    ));
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy, store.clone(), CollectorConfig::default());

    failures::collect(&ctx, &array("A1")).await.unwrap();
    assert_eq!(store.written().len(), 1);
    assert_eq!(store.written()[0].len(), 1);

    // Same upstream list, store now holds the tuple: no second write, even
    // after many ticks.
    for _ in 0..10 {
        failures::collect(&ctx, &array("A1")).await.unwrap();
    }
    assert_eq!(store.written().len(), 1);
}

#[tokio::test]
async fn new_failure_tuple_is_written_alongside_known_ones() {
    let proxy = Arc::new(MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            failures: vec![drive_failure("R1"), drive_failure("R2")],
            ..Default::default()
        },
    ));
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy, store.clone(), CollectorConfig::default());

    // Seed the store with R1 only.
    let mut seeded = CollectionBatch::new("A1");
    seeded.push(
        eseries_collector::point::FailureRecord {
            key: FailureKey {
                failure_type: "drive".to_string(),
                object_ref: "R1".to_string(),
                object_type: "disk".to_string(),
            },
            observed_at: chrono::Utc::now(),
        }
        .into_point(&array("A1")),
    );
    store.write_batch(&seeded).await.unwrap();

    failures::collect(&ctx, &array("A1")).await.unwrap();

    let written = store.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[1].len(), 1);
    assert_eq!(written[1].points[0].tags["object_ref"], "R2");
}

// =============================================================================
// System metrics
// =============================================================================

#[tokio::test]
async fn metrics_produce_expected_point_counts_and_complete_field_sets() {
    let inventory = HardwareInventory {
        trays: vec![TraySummary {
            tray_ref: "T1".to_string(),
            tray_id: 1,
        }],
        drives: vec![DriveSummary {
            drive_ref: "D1".to_string(),
            physical_location: PhysicalLocation {
                tray_ref: "T1".to_string(),
                slot: 4,
            },
        }],
    };
    let system: StatsObject = serde_json::from_value(serde_json::json!({
        "maxCpuUtilization": 88.0
    }))
    .unwrap();
    let proxy = Arc::new(MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            drives: vec![drive_stats("D1"), drive_stats("D2")],
            inventory: Some(inventory),
            system,
            volumes: vec![volume_stats("vol-a"), volume_stats("vol-b"), volume_stats("vol-c")],
            ..Default::default()
        },
    ));
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy, store.clone(), CollectorConfig::default());

    metrics::collect(&ctx, &array("A1")).await.unwrap();

    let written = store.written();
    assert_eq!(written.len(), 1, "one store call per array");
    let batch = &written[0];
    // 2 disks + 1 system + 3 volumes.
    assert_eq!(batch.len(), 6);

    let disks: Vec<_> = batch
        .points
        .iter()
        .filter(|p| p.measurement == Measurement::Disks)
        .collect();
    assert_eq!(disks.len(), 2);
    for point in &disks {
        // Every defined metric name present, null where the source is silent.
        assert_eq!(point.fields.len(), DRIVE_METRICS.len());
        assert_eq!(point.fields["readIOps"], FieldValue::Float(100.0));
        assert_eq!(point.fields["combinedIOps"], FieldValue::Null);
    }

    // D1 resolves through the inventory; D2 has no location and omits the tags.
    let d1 = disks
        .iter()
        .find(|p| p.tags.get("sys_tray").is_some())
        .unwrap();
    assert_eq!(d1.tags["sys_tray"], "01");
    assert_eq!(d1.tags["sys_tray_slot"], "004");
    assert!(disks.iter().any(|p| !p.tags.contains_key("sys_tray")));

    let systems: Vec<_> = batch
        .points
        .iter()
        .filter(|p| p.measurement == Measurement::Systems)
        .collect();
    assert_eq!(systems.len(), 1);
    assert_eq!(systems[0].fields["maxCpuUtilization"], FieldValue::Float(88.0));
    assert_eq!(systems[0].fields["cpuAvgUtilization"], FieldValue::Null);

    let volumes: Vec<_> = batch
        .points
        .iter()
        .filter(|p| p.measurement == Measurement::Volumes)
        .collect();
    assert_eq!(volumes.len(), 3);
    for point in &volumes {
        assert_eq!(point.fields.len(), VOLUME_METRICS.len());
        assert!(point.tags.contains_key("vol_name"));
    }
}

#[traced_test]
#[tokio::test]
async fn name_toggles_log_discovered_drives_and_volumes() {
    let proxy = Arc::new(MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            drives: vec![drive_stats("D1")],
            volumes: vec![volume_stats("vol-a")],
            ..Default::default()
        },
    ));
    let store = Arc::new(MockStore::default());
    let mut config = CollectorConfig::default();
    config.logging.show_drive_names = true;
    config.logging.show_volume_names = true;
    let ctx = CollectionContext::new(proxy, store, config);

    metrics::collect(&ctx, &array("A1")).await.unwrap();

    assert!(logs_contain("drive found"));
    assert!(logs_contain("volume found"));
}

// =============================================================================
// Fan-out executor
// =============================================================================

#[tokio::test]
async fn one_broken_array_does_not_block_the_others() {
    let proxy = Arc::new(
        MockProxy::default()
            .with_array(
                "bad",
                ArrayFixture {
                    fail_requests: true,
                    ..Default::default()
                },
            )
            .with_array(
                "good",
                ArrayFixture {
                    volumes: vec![volume_stats("vol-a")],
                    events: vec![mel_event(1)],
                    failures: vec![drive_failure("R1")],
                    ..Default::default()
                },
            ),
    );
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy.clone(), store.clone(), CollectorConfig::default());

    let arrays = proxy.list_arrays().await.unwrap();
    FanOutExecutor::new(4).run_tick(&ctx, &arrays).await;

    let written = store.written();
    // The good array produced one batch per collector kind.
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|batch| batch.array_id == "good"));
}

#[tokio::test]
async fn phases_run_metrics_then_failures_then_events() {
    let fixture = ArrayFixture {
        volumes: vec![volume_stats("vol-a")],
        events: vec![mel_event(1)],
        failures: vec![drive_failure("R1")],
        ..Default::default()
    };
    let proxy = Arc::new(
        MockProxy::default()
            .with_array("A1", fixture.clone())
            .with_array("A2", fixture),
    );
    let store = Arc::new(MockStore::default());
    let ctx = CollectionContext::new(proxy.clone(), store.clone(), CollectorConfig::default());

    let arrays = proxy.list_arrays().await.unwrap();
    FanOutExecutor::new(2).run_tick(&ctx, &arrays).await;

    let phases: Vec<u8> = store
        .written()
        .iter()
        .map(|batch| match batch.points[0].measurement {
            Measurement::Disks | Measurement::Systems | Measurement::Volumes => 0,
            Measurement::Failures => 1,
            Measurement::MajorEventLog => 2,
        })
        .collect();
    assert_eq!(phases.len(), 6);
    let mut sorted = phases.clone();
    sorted.sort_unstable();
    assert_eq!(phases, sorted, "writes must arrive in phase order");
}

// =============================================================================
// Dry run
// =============================================================================

#[tokio::test]
async fn dry_run_collects_everything_but_writes_nothing() {
    let proxy = Arc::new(MockProxy::default().with_array(
        "A1",
        ArrayFixture {
            drives: vec![drive_stats("D1")],
            volumes: vec![volume_stats("vol-a")],
            events: vec![mel_event(1)],
            failures: vec![drive_failure("R1")],
            ..Default::default()
        },
    ));
    let store = Arc::new(MockStore::default());
    let mut config = CollectorConfig::default();
    config.collector.dry_run = true;
    let ctx = CollectionContext::new(proxy.clone(), store.clone(), config);

    let arrays = proxy.list_arrays().await.unwrap();
    FanOutExecutor::new(2).run_tick(&ctx, &arrays).await;

    // All three collectors ran (the event endpoint saw a request), yet
    // nothing reached the store.
    assert!(!proxy.event_requests.lock().unwrap().is_empty());
    assert!(store.written().is_empty());
}
