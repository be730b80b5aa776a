//! Historical demand: columnar trip records turned into a replayable request stream.
//!
//! Loading reads every batch of a parquet or Arrow IPC (feather) file, keeps the
//! records inside the simulated window and the geofence, optionally samples them
//! down to `bookings_per_hour`, and numbers the survivors `0..n` in
//! `(request_time, file order)`. The engine consumes them through [`DemandSource`].

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit};
use arrow::ipc::reader::FileReader;
use arrow::record_batch::RecordBatch;
use bevy_ecs::prelude::Resource;
use chrono::{DateTime, NaiveDateTime};
use h3o::LatLng;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::clock::ONE_HOUR_MS;
use crate::ecs::BookingId;
use crate::error::DataError;
use crate::geofence::{Geofence, OutOfBoundsPolicy, Placement};

pub const PICKUP_LAT: &str = "pickup_lat";
pub const PICKUP_LON: &str = "pickup_lon";
pub const DROPOFF_LAT: &str = "dropoff_lat";
pub const DROPOFF_LON: &str = "dropoff_lon";
pub const PICKUP_DATETIME: &str = "pickup_datetime";

/// One ride request as the engine admits it. `request_time` is ms since the start.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub id: BookingId,
    pub origin: LatLng,
    pub destination: LatLng,
    pub request_time: u64,
}

/// A finite, time-ordered, restartable stream of booking requests.
pub trait DemandSource: Send + Sync {
    /// Request time of the next request without consuming it.
    fn peek_request_time(&self) -> Option<u64>;

    fn next_request(&mut self) -> Option<BookingRequest>;

    /// Rewind to the first request. The replayed sequence is identical.
    fn reset(&mut self);

    /// Requests not yet handed out.
    fn remaining(&self) -> usize;
}

/// Replays a prepared request list in order.
#[derive(Debug, Clone, Default)]
pub struct ReplayDemand {
    requests: Vec<BookingRequest>,
    cursor: usize,
}

impl ReplayDemand {
    /// Requests are sorted by `(request_time, id)` so the stream is non-decreasing.
    pub fn new(mut requests: Vec<BookingRequest>) -> Self {
        requests.sort_by_key(|r| (r.request_time, r.id));
        Self {
            requests,
            cursor: 0,
        }
    }
}

impl DemandSource for ReplayDemand {
    fn peek_request_time(&self) -> Option<u64> {
        self.requests.get(self.cursor).map(|r| r.request_time)
    }

    fn next_request(&mut self) -> Option<BookingRequest> {
        let request = self.requests.get(self.cursor).cloned();
        if request.is_some() {
            self.cursor += 1;
        }
        request
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn remaining(&self) -> usize {
        self.requests.len() - self.cursor
    }
}

/// The engine's demand stream.
#[derive(Resource)]
pub struct DemandFeed(pub Box<dyn DemandSource>);

/// Knobs for turning raw records into requests.
#[derive(Debug, Clone)]
pub struct DemandOptions {
    pub starting_time: NaiveDateTime,
    pub duration_ms: u64,
    pub bookings_per_hour: Option<f64>,
    pub seed: u64,
    pub out_of_bounds: OutOfBoundsPolicy,
}

/// What happened to the records of a demand file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemandLoadStats {
    pub rows: usize,
    /// Rows skipped for a null or invalid coordinate or timestamp.
    pub malformed: usize,
    pub outside_window: usize,
    /// Rows dropped by the `reject` policy.
    pub out_of_bounds: usize,
    /// Rows kept with at least one coordinate moved onto the geofence.
    pub clamped: usize,
    pub sampled_out: usize,
    pub kept: usize,
}

/// A demand record before filtering. Coordinates are already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub pickup: LatLng,
    pub dropoff: LatLng,
    pub requested_at: NaiveDateTime,
}

/// Load a demand file and prepare the request list.
pub fn load_demand(
    path: &Path,
    geofence: &Geofence,
    options: &DemandOptions,
) -> Result<(Vec<BookingRequest>, DemandLoadStats), DataError> {
    let mut stats = DemandLoadStats::default();
    let records = read_trip_records(path, &mut stats)?;
    let requests = prepare_requests(records, geofence, options, &mut stats);
    info!(
        path = %path.display(),
        rows = stats.rows,
        kept = stats.kept,
        malformed = stats.malformed,
        outside_window = stats.outside_window,
        out_of_bounds = stats.out_of_bounds,
        clamped = stats.clamped,
        sampled_out = stats.sampled_out,
        "loaded demand"
    );
    Ok((requests, stats))
}

/// Filter, sample and number raw records.
pub fn prepare_requests(
    records: Vec<TripRecord>,
    geofence: &Geofence,
    options: &DemandOptions,
    stats: &mut DemandLoadStats,
) -> Vec<BookingRequest> {
    let mut in_window: Vec<(u64, LatLng, LatLng)> = Vec::with_capacity(records.len());
    for record in records {
        let offset_ms = (record.requested_at - options.starting_time).num_milliseconds();
        if offset_ms < 0 || offset_ms as u64 >= options.duration_ms {
            stats.outside_window += 1;
            continue;
        }
        let pickup = geofence.place(record.pickup, options.out_of_bounds);
        let dropoff = geofence.place(record.dropoff, options.out_of_bounds);
        let (Some(origin), Some(destination)) = (pickup.position(), dropoff.position()) else {
            stats.out_of_bounds += 1;
            continue;
        };
        if matches!(pickup, Placement::Clamped(_)) || matches!(dropoff, Placement::Clamped(_)) {
            stats.clamped += 1;
        }
        in_window.push((offset_ms as u64, origin, destination));
    }

    // Stable: equal timestamps keep file order.
    in_window.sort_by_key(|(at, _, _)| *at);

    let kept = match options.bookings_per_hour {
        Some(per_hour) => sample_per_hour(in_window, per_hour, options, stats),
        None => in_window,
    };

    stats.kept = kept.len();
    kept.into_iter()
        .enumerate()
        .map(|(i, (request_time, origin, destination))| BookingRequest {
            id: BookingId(i as u64),
            origin,
            destination,
            request_time,
        })
        .collect()
}

/// Keep at most `round(per_hour * bucket_len / 1h)` records per simulated hour,
/// chosen uniformly without replacement. Input must be sorted by time.
fn sample_per_hour<T>(
    sorted: Vec<(u64, T, T)>,
    per_hour: f64,
    options: &DemandOptions,
    stats: &mut DemandLoadStats,
) -> Vec<(u64, T, T)> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut kept = Vec::with_capacity(sorted.len());
    let mut bucket: Vec<(u64, T, T)> = Vec::new();
    let mut bucket_index = 0u64;

    let mut flush = |bucket: &mut Vec<(u64, T, T)>, bucket_index: u64, kept: &mut Vec<(u64, T, T)>| {
        if bucket.is_empty() {
            return;
        }
        let bucket_start = bucket_index * ONE_HOUR_MS;
        let bucket_len = options.duration_ms.saturating_sub(bucket_start).min(ONE_HOUR_MS);
        let quota = (per_hour * bucket_len as f64 / ONE_HOUR_MS as f64).round().max(0.0) as usize;

        if bucket.len() <= quota {
            kept.append(bucket);
            return;
        }
        stats.sampled_out += bucket.len() - quota;
        let mut chosen = index::sample(&mut rng, bucket.len(), quota).into_vec();
        chosen.sort_unstable();
        let mut chosen = chosen.into_iter().peekable();
        for (i, item) in bucket.drain(..).enumerate() {
            if chosen.peek() == Some(&i) {
                chosen.next();
                kept.push(item);
            }
        }
    };

    for item in sorted {
        let item_bucket = item.0 / ONE_HOUR_MS;
        if item_bucket != bucket_index {
            flush(&mut bucket, bucket_index, &mut kept);
            bucket_index = item_bucket;
        }
        bucket.push(item);
    }
    flush(&mut bucket, bucket_index, &mut kept);
    kept
}

/// Parse `YYYY-MM-DD HH:MM:SS` (optionally with fractional seconds or a `T`
/// separator) or an RFC 3339 timestamp, which is converted to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.naive_utc())
}

// ---------------------------------------------------------------------------
// File readers
// ---------------------------------------------------------------------------

/// Read every record of a parquet or feather file. Malformed rows are skipped
/// and counted; a missing column or unreadable file fails the whole load.
pub fn read_trip_records(
    path: &Path,
    stats: &mut DemandLoadStats,
) -> Result<Vec<TripRecord>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let arrow_err = |source| DataError::Arrow {
        path: path.to_path_buf(),
        source,
    };
    let batches: Vec<RecordBatch> = match extension.as_str() {
        "parquet" => ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|builder| builder.build())
            .map_err(|source| DataError::Parquet {
                path: path.to_path_buf(),
                source,
            })?
            .collect::<Result<_, _>>()
            .map_err(arrow_err)?,
        "feather" | "arrow" | "ipc" => FileReader::try_new(file, None)
            .map_err(arrow_err)?
            .collect::<Result<_, _>>()
            .map_err(arrow_err)?,
        other => {
            return Err(DataError::Demand {
                path: path.to_path_buf(),
                reason: format!("unsupported demand file extension `{other}`"),
            })
        }
    };

    let mut records = Vec::new();
    for batch in &batches {
        read_batch(path, batch, &mut records, stats)?;
    }
    Ok(records)
}

fn column<'a>(path: &Path, batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, DataError> {
    batch.column_by_name(name).ok_or_else(|| DataError::Demand {
        path: path.to_path_buf(),
        reason: format!("missing required column `{name}`"),
    })
}

fn float_column(path: &Path, batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let raw = column(path, batch, name)?;
    let values = cast(raw, &DataType::Float64).map_err(|source| DataError::Arrow {
        path: path.to_path_buf(),
        source,
    })?;
    let values = values.as_primitive::<Float64Type>();
    Ok((0..values.len())
        .map(|i| (!values.is_null(i)).then(|| values.value(i)))
        .collect())
}

fn timestamp_column(
    path: &Path,
    batch: &RecordBatch,
) -> Result<Vec<Option<NaiveDateTime>>, DataError> {
    let raw = column(path, batch, PICKUP_DATETIME)?;
    let arrow_err = |source| DataError::Arrow {
        path: path.to_path_buf(),
        source,
    };

    let millis_per_unit = |unit: &TimeUnit| -> (i64, i64) {
        match unit {
            TimeUnit::Second => (1000, 1),
            TimeUnit::Millisecond => (1, 1),
            TimeUnit::Microsecond => (1, 1000),
            TimeUnit::Nanosecond => (1, 1_000_000),
        }
    };

    let (mul, div) = match raw.data_type() {
        DataType::Timestamp(unit, _) => millis_per_unit(unit),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => (1000, 1),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let strings = cast(raw, &DataType::Utf8).map_err(arrow_err)?;
            let strings = strings.as_string::<i32>();
            return Ok((0..strings.len())
                .map(|i| {
                    if strings.is_null(i) {
                        None
                    } else {
                        parse_timestamp(strings.value(i))
                    }
                })
                .collect());
        }
        other => {
            return Err(DataError::Demand {
                path: path.to_path_buf(),
                reason: format!("column `{PICKUP_DATETIME}` has unsupported type {other}"),
            })
        }
    };

    let ints = cast(raw, &DataType::Int64).map_err(arrow_err)?;
    let ints = ints.as_primitive::<Int64Type>();
    Ok((0..ints.len())
        .map(|i| {
            if ints.is_null(i) {
                return None;
            }
            let millis = ints.value(i).checked_mul(mul)? / div;
            DateTime::from_timestamp_millis(millis).map(|at| at.naive_utc())
        })
        .collect())
}

fn read_batch(
    path: &Path,
    batch: &RecordBatch,
    out: &mut Vec<TripRecord>,
    stats: &mut DemandLoadStats,
) -> Result<(), DataError> {
    let pickup_lat = float_column(path, batch, PICKUP_LAT)?;
    let pickup_lon = float_column(path, batch, PICKUP_LON)?;
    let dropoff_lat = float_column(path, batch, DROPOFF_LAT)?;
    let dropoff_lon = float_column(path, batch, DROPOFF_LON)?;
    let times = timestamp_column(path, batch)?;

    for row in 0..batch.num_rows() {
        stats.rows += 1;
        let coord = |lat: Option<f64>, lng: Option<f64>| LatLng::new(lat?, lng?).ok();
        let record = match (
            coord(pickup_lat[row], pickup_lon[row]),
            coord(dropoff_lat[row], dropoff_lon[row]),
            times[row],
        ) {
            (Some(pickup), Some(dropoff), Some(requested_at)) => TripRecord {
                pickup,
                dropoff,
                requested_at,
            },
            _ => {
                stats.malformed += 1;
                warn!(path = %path.display(), row = stats.rows - 1, "skipping malformed demand record");
                continue;
            }
        };
        out.push(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
    use arrow::ipc::writer::FileWriter;
    use parquet::arrow::ArrowWriter;

    use crate::clock::ONE_MIN_MS;
    use crate::test_helpers::{test_geofence, test_location, test_location_offset};

    fn start() -> NaiveDateTime {
        parse_timestamp("2019-02-01 08:00:00").expect("start")
    }

    fn options(bookings_per_hour: Option<f64>) -> DemandOptions {
        DemandOptions {
            starting_time: start(),
            duration_ms: 2 * ONE_HOUR_MS,
            bookings_per_hour,
            seed: 7,
            out_of_bounds: OutOfBoundsPolicy::Reject,
        }
    }

    fn record(minutes: i64) -> TripRecord {
        TripRecord {
            pickup: test_location(),
            dropoff: test_location_offset(0.01, 0.0),
            requested_at: start() + chrono::Duration::minutes(minutes),
        }
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        let expected = start();
        assert_eq!(parse_timestamp("2019-02-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2019-02-01T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2019-02-01 08:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2019-02-01T09:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn keeps_window_sorts_and_numbers_requests() {
        let fence = test_geofence(0.1);
        let records = vec![record(30), record(-5), record(10), record(120), record(10)];
        let mut stats = DemandLoadStats::default();
        let requests = prepare_requests(records, &fence, &options(None), &mut stats);

        let times: Vec<u64> = requests.iter().map(|r| r.request_time).collect();
        assert_eq!(times, vec![10 * ONE_MIN_MS, 10 * ONE_MIN_MS, 30 * ONE_MIN_MS]);
        let ids: Vec<u64> = requests.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(stats.outside_window, 2);
        assert_eq!(stats.kept, 3);
    }

    #[test]
    fn out_of_bounds_records_follow_policy() {
        let fence = test_geofence(0.05);
        let mut far = record(1);
        far.dropoff = test_location_offset(0.5, 0.0);
        let records = vec![record(0), far];

        let mut stats = DemandLoadStats::default();
        let rejected = prepare_requests(records.clone(), &fence, &options(None), &mut stats);
        assert_eq!(rejected.len(), 1);
        assert_eq!(stats.out_of_bounds, 1);

        let mut clamp = options(None);
        clamp.out_of_bounds = OutOfBoundsPolicy::Clamp;
        let mut stats = DemandLoadStats::default();
        let clamped = prepare_requests(records, &fence, &clamp, &mut stats);
        assert_eq!(clamped.len(), 2);
        assert_eq!(stats.clamped, 1);
        let top_edge = test_location().lat() + 0.05;
        assert!((clamped[1].destination.lat() - top_edge).abs() < 1e-6);
    }

    #[test]
    fn sampling_caps_each_hour_and_is_seeded() {
        let fence = test_geofence(0.1);
        let records: Vec<TripRecord> = (0..120).map(record).collect();

        let mut stats = DemandLoadStats::default();
        let first = prepare_requests(records.clone(), &fence, &options(Some(10.0)), &mut stats);
        assert_eq!(first.len(), 20);
        assert_eq!(stats.sampled_out, 100);
        let in_first_hour = first.iter().filter(|r| r.request_time < ONE_HOUR_MS).count();
        assert_eq!(in_first_hour, 10);
        assert!(first.windows(2).all(|w| w[0].request_time <= w[1].request_time));

        let mut again = DemandLoadStats::default();
        let second = prepare_requests(records, &fence, &options(Some(10.0)), &mut again);
        assert_eq!(first, second);
    }

    #[test]
    fn replay_is_ordered_and_restartable() {
        let fence = test_geofence(0.1);
        let mut stats = DemandLoadStats::default();
        let requests = prepare_requests(vec![record(5), record(1)], &fence, &options(None), &mut stats);
        let mut source = ReplayDemand::new(requests);

        assert_eq!(source.peek_request_time(), Some(ONE_MIN_MS));
        let a = source.next_request().expect("first");
        let b = source.next_request().expect("second");
        assert!(a.request_time <= b.request_time);
        assert!(source.next_request().is_none());
        assert_eq!(source.remaining(), 0);

        source.reset();
        assert_eq!(source.next_request(), Some(a));
    }

    /// Three trips: rows 0 and 2 are valid, row 1 has no pickup latitude.
    fn trip_batch(times: ArrayRef) -> RecordBatch {
        let origin = test_location();
        let dest = test_location_offset(0.01, 0.0);
        let column = |values: Vec<Option<f64>>| Arc::new(Float64Array::from(values)) as ArrayRef;
        RecordBatch::try_from_iter(vec![
            (PICKUP_LAT, column(vec![Some(origin.lat()), None, Some(origin.lat())])),
            (PICKUP_LON, column(vec![Some(origin.lng()); 3])),
            (DROPOFF_LAT, column(vec![Some(dest.lat()); 3])),
            (DROPOFF_LON, column(vec![Some(dest.lng()); 3])),
            (PICKUP_DATETIME, times),
        ])
        .expect("batch")
    }

    fn write_parquet(path: &Path, batch: &RecordBatch) {
        let file = File::create(path).expect("create");
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).expect("writer");
        writer.write(batch).expect("write");
        writer.close().expect("close");
    }

    fn read(path: &Path) -> (Vec<NaiveDateTime>, DemandLoadStats) {
        let mut stats = DemandLoadStats::default();
        let records = read_trip_records(path, &mut stats).expect("read");
        (records.into_iter().map(|r| r.requested_at).collect(), stats)
    }

    fn start_millis() -> i64 {
        start().and_utc().timestamp_millis()
    }

    #[test]
    fn reads_feather_with_string_timestamps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("demand.feather");
        let times = Arc::new(StringArray::from(vec![
            "2019-02-01 08:01:30",
            "2019-02-01 08:02:00",
            "2019-02-01T09:00:00",
        ])) as ArrayRef;
        let batch = trip_batch(times);
        let file = File::create(&path).expect("create");
        let mut writer = FileWriter::try_new(file, &batch.schema()).expect("writer");
        writer.write(&batch).expect("write");
        writer.finish().expect("finish");

        let (times, stats) = read(&path);
        assert_eq!(
            times,
            vec![start() + chrono::Duration::seconds(90), start() + chrono::Duration::hours(1)]
        );
        assert_eq!((stats.rows, stats.malformed), (3, 1));
    }

    #[test]
    fn reads_parquet_with_millisecond_timestamps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("demand.parquet");
        let times = Arc::new(TimestampMillisecondArray::from(vec![
            Some(start_millis() + 1_500),
            Some(start_millis()),
            Some(start_millis() + 60_000),
        ])) as ArrayRef;
        write_parquet(&path, &trip_batch(times));

        let (times, stats) = read(&path);
        assert_eq!(
            times,
            vec![
                start() + chrono::Duration::milliseconds(1_500),
                start() + chrono::Duration::minutes(1)
            ]
        );
        assert_eq!((stats.rows, stats.malformed), (3, 1));
    }

    #[test]
    fn reads_parquet_with_epoch_second_integers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("demand.parquet");
        let start_secs = start_millis() / 1000;
        let times = Arc::new(Int64Array::from(vec![
            Some(start_secs + 30),
            Some(start_secs),
            None,
        ])) as ArrayRef;
        write_parquet(&path, &trip_batch(times));

        let (times, stats) = read(&path);
        assert_eq!(times, vec![start() + chrono::Duration::seconds(30)]);
        // Row 1 lacks a coordinate, row 2 a timestamp.
        assert_eq!((stats.rows, stats.malformed), (3, 2));
    }
}
