//! System metrics collection.
//!
//! Stateless per-array transform: pull the analysed drive, system, and volume
//! statistics, shape them into points, and write the whole batch in one store
//! call. Disk points carry tray/slot location tags resolved through the
//! hardware inventory; a disk whose location cannot be resolved still yields a
//! point, just without those tags.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::collect::CollectionContext;
use crate::error::AppResult;
use crate::point::{
    pick_fields, CollectionBatch, Measurement, MetricPoint, StorageArray, DRIVE_METRICS,
    SYSTEM_METRICS, VOLUME_METRICS,
};
use crate::proxy::HardwareInventory;

/// Tray id and slot for one drive.
pub type DriveLocation = (i64, i64);

/// Collect all system metrics for one array and write them as a single batch.
pub async fn collect(ctx: &CollectionContext, array: &StorageArray) -> AppResult<()> {
    let logging = &ctx.config.logging;
    let mut batch = CollectionBatch::new(array.id.clone());

    // Drives: statistics joined against the hardware inventory for location.
    let drive_stats = ctx.proxy.analysed_drive_statistics(&array.id).await?;
    let inventory = ctx.proxy.hardware_inventory(&array.id).await?;
    let locations = resolve_drive_locations(&inventory);

    for stats in &drive_stats {
        if logging.show_drive_names {
            info!(array = %array.display_name(), drive = %stats.disk_id, "drive found");
        }
        let mut point = MetricPoint::new(Measurement::Disks)
            .tag("sys_id", array.id.clone())
            .tag("sys_name", array.display_name());

        match locations.get(&stats.disk_id) {
            Some(&(tray, slot)) => {
                point = point
                    .tag("sys_tray", format_tray(tray))
                    .tag("sys_tray_slot", format_slot(slot));
            }
            None => {
                warn!(
                    array = %array.display_name(),
                    disk = %stats.disk_id,
                    "drive location could not be resolved; writing point without tray/slot tags"
                );
            }
        }

        point.fields = pick_fields(&stats.metrics, &DRIVE_METRICS);
        if logging.show_drive_metrics {
            debug!(array = %array.display_name(), payload = ?point, "drive payload");
        }
        batch.push(point);
    }

    // System: one point per array.
    let system_stats = ctx.proxy.analysed_system_statistics(&array.id).await?;
    let mut system_point = MetricPoint::new(Measurement::Systems)
        .tag("sys_id", array.id.clone())
        .tag("sys_name", array.display_name());
    system_point.fields = pick_fields(&system_stats, &SYSTEM_METRICS);
    if logging.show_system_metrics {
        debug!(array = %array.display_name(), payload = ?system_point, "system payload");
    }
    batch.push(system_point);

    // Volumes: one point per volume.
    let volume_stats = ctx.proxy.analysed_volume_statistics(&array.id).await?;
    for stats in &volume_stats {
        if logging.show_volume_names {
            info!(array = %array.display_name(), volume = %stats.volume_name, "volume found");
        }
        let mut point = MetricPoint::new(Measurement::Volumes)
            .tag("sys_id", array.id.clone())
            .tag("sys_name", array.display_name())
            .tag("vol_name", stats.volume_name.clone());
        point.fields = pick_fields(&stats.metrics, &VOLUME_METRICS);
        if logging.show_volume_metrics {
            debug!(array = %array.display_name(), payload = ?point, "volume payload");
        }
        batch.push(point);
    }

    ctx.write_batch(&batch).await
}

/// Build the drive-ref to tray/slot map from the hardware inventory.
///
/// A drive whose tray reference matches no tray is logged and left out of the
/// map; its point is built without location tags.
pub fn resolve_drive_locations(inventory: &HardwareInventory) -> HashMap<String, DriveLocation> {
    let tray_ids: HashMap<&str, i64> = inventory
        .trays
        .iter()
        .map(|tray| (tray.tray_ref.as_str(), tray.tray_id))
        .collect();

    let mut locations = HashMap::new();
    for drive in &inventory.drives {
        match tray_ids.get(drive.physical_location.tray_ref.as_str()) {
            Some(&tray_id) => {
                locations.insert(
                    drive.drive_ref.clone(),
                    (tray_id, drive.physical_location.slot),
                );
            }
            None => {
                warn!(
                    drive = %drive.drive_ref,
                    tray_ref = %drive.physical_location.tray_ref,
                    "error matching drive to a tray in the storage system"
                );
            }
        }
    }
    locations
}

/// Zero-padded 2-digit tray tag, for consistent downstream sorting.
fn format_tray(tray: i64) -> String {
    format!("{tray:02}")
}

/// Zero-padded 3-digit slot tag, for consistent downstream sorting.
fn format_slot(slot: i64) -> String {
    format!("{slot:03}")
}
