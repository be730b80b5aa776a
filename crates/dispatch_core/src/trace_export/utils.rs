use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use h3o::{CellIndex, LatLng, Resolution};
use parquet::arrow::ArrowWriter;

use crate::error::ExportError;

pub(super) const TRACE_COLUMNS: [&str; 17] = [
    "time_ms",
    "datetime",
    "event",
    "booking_id",
    "vehicle_id",
    "lat",
    "lon",
    "cell",
    "vehicle_state",
    "booking_status",
    "pickup_eta_secs",
    "route_origin_lat",
    "route_origin_lon",
    "route_destination_lat",
    "route_destination_lon",
    "traveled_km",
    "detail",
];

pub(super) const BOOKING_COLUMNS: [&str; 16] = [
    "booking_id",
    "status",
    "vehicle_id",
    "requested_at",
    "requested_at_ms",
    "assigned_at_ms",
    "picked_up_at_ms",
    "dropped_off_at_ms",
    "expired_at_ms",
    "wait_secs",
    "ride_secs",
    "pickup_lat",
    "pickup_lon",
    "dropoff_lat",
    "dropoff_lon",
    "map_matched",
];

pub(super) fn u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, false)
}

pub(super) fn nullable_u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, true)
}

pub(super) fn f64_field(name: &'static str) -> Field {
    Field::new(name, DataType::Float64, false)
}

pub(super) fn nullable_f64_field(name: &'static str) -> Field {
    Field::new(name, DataType::Float64, true)
}

pub(super) fn utf8_field(name: &'static str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

pub(super) fn nullable_utf8_field(name: &'static str) -> Field {
    Field::new(name, DataType::Utf8, true)
}

pub(super) fn bool_field(name: &'static str) -> Field {
    Field::new(name, DataType::Boolean, false)
}

/// Creates `path` and any missing parent directories.
pub(super) fn create_file(path: &Path) -> Result<File, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    File::create(path).map_err(io_error)
}

pub(super) fn write_record_batch(
    path: &Path,
    schema: Schema,
    arrays: Vec<ArrayRef>,
) -> Result<(), ExportError> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = create_file(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub(super) fn format_datetime(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub(super) fn cell_of(position: LatLng, resolution: Resolution) -> CellIndex {
    position.to_cell(resolution)
}

pub(super) fn secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Distances are written in metre precision.
pub(super) fn round_km(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}
