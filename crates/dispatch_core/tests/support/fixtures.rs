#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dispatch_core::test_helpers::{test_location, test_location_offset};
use h3o::LatLng;
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

use super::engine::epoch;

/// A scenario written to a temporary directory.
pub struct ScenarioFiles {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl ScenarioFiles {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// A demand row; `at` is written verbatim to `pickup_datetime`.
#[derive(Debug, Clone)]
pub struct TripRow {
    pub pickup: LatLng,
    pub dropoff: LatLng,
    pub at: String,
}

/// `n` trips spread over the first minutes of the run, all inside the default geofence.
pub fn sample_trips(n: usize) -> Vec<TripRow> {
    (0..n)
        .map(|i| TripRow {
            pickup: test_location_offset(
                ((i * 7) % 11) as f64 * 0.002 - 0.01,
                ((i * 5) % 13) as f64 * 0.002 - 0.012,
            ),
            dropoff: test_location_offset(
                ((i * 3) % 17) as f64 * 0.002 - 0.016,
                ((i * 11) % 7) as f64 * 0.003 - 0.009,
            ),
            at: timestamp_at_secs(i as i64 * 37),
        })
        .collect()
}

pub fn timestamp_at_secs(secs: i64) -> String {
    (epoch() + chrono::Duration::seconds(secs))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Builder that writes geofence, stations, demand and config files.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    pub geofence_half_side: f64,
    pub stations: Vec<LatLng>,
    pub trips: Vec<TripRow>,
    pub vehicles: usize,
    pub solver: &'static str,
    pub output: String,
    pub duration_minutes: f64,
    pub clock_step_secs: f64,
    pub max_pending_minutes: f64,
    pub bookings_per_hour: Option<f64>,
    pub demand_file: &'static str,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self {
            geofence_half_side: 0.05,
            stations: vec![test_location(), test_location_offset(0.01, 0.01)],
            trips: sample_trips(40),
            vehicles: 4,
            solver: "greedy_matcher",
            output: "out/trace.csv".to_string(),
            duration_minutes: 60.0,
            clock_step_secs: 10.0,
            max_pending_minutes: 5.0,
            bookings_per_hour: None,
            demand_file: "demand.parquet",
        }
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trip(mut self, pickup: LatLng, dropoff: LatLng, at: &str) -> Self {
        self.trips.push(TripRow {
            pickup,
            dropoff,
            at: at.to_string(),
        });
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn with_solver(mut self, solver: &'static str) -> Self {
        self.solver = solver;
        self
    }

    pub fn write(&self) -> ScenarioFiles {
        let dir = tempfile::tempdir().expect("temp dir");
        write_geofence(&dir.path().join("geofence.geojson"), self.geofence_half_side);
        write_stations(&dir.path().join("stations.geojson"), &self.stations);
        write_demand_parquet(&dir.path().join(self.demand_file), &self.trips);

        let config_path = dir.path().join("scenario.toml");
        fs::write(&config_path, self.config_toml()).expect("write config");
        ScenarioFiles { dir, config_path }
    }

    pub fn config_toml(&self) -> String {
        let per_hour = self
            .bookings_per_hour
            .map(|n| format!("bookings_per_hour = {n}\n"))
            .unwrap_or_default();
        format!(
            r#"geofence = "geofence.geojson"
demand_file = "{demand}"

[fleet]
stations = "stations.geojson"
vehicles = {vehicles}
router = "linear"

[bookings]
max_pending_time = {max_pending}
{per_hour}
[simulation]
duration = {duration}
starting_time = "2019-02-01 08:00:00"
resolution = 9
demand_seed = 7
fleet_seed = 11
clock_step = {step}
output = "{output}"
solver = "{solver}"

[greedy_matcher]
search_radius = 10
router = "linear"

[batch_matcher]
search_radius = 10
router = "linear"

[linear]
speed = 30
"#,
            demand = self.demand_file,
            vehicles = self.vehicles,
            max_pending = self.max_pending_minutes,
            duration = self.duration_minutes,
            step = self.clock_step_secs,
            output = self.output,
            solver = self.solver,
        )
    }
}

pub fn write_geofence(path: &Path, half_side: f64) {
    let c = test_location();
    let (w, e, s, n) = (
        c.lng() - half_side,
        c.lng() + half_side,
        c.lat() - half_side,
        c.lat() + half_side,
    );
    let body = format!(
        r#"{{"type": "FeatureCollection", "features": [{{"type": "Feature", "properties": {{}},
            "geometry": {{"type": "Polygon", "coordinates": [[[{w}, {s}], [{e}, {s}], [{e}, {n}], [{w}, {n}], [{w}, {s}]]]}}}}]}}"#
    );
    fs::write(path, body).expect("write geofence");
}

pub fn write_stations(path: &Path, stations: &[LatLng]) {
    let features: Vec<String> = stations
        .iter()
        .map(|p| {
            format!(
                r#"{{"type": "Feature", "properties": {{}}, "geometry": {{"type": "Point", "coordinates": [{}, {}]}}}}"#,
                p.lng(),
                p.lat()
            )
        })
        .collect();
    let body = format!(
        r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
        features.join(",")
    );
    fs::write(path, body).expect("write stations");
}

pub fn write_demand_parquet(path: &Path, trips: &[TripRow]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("pickup_lat", DataType::Float64, false),
        Field::new("pickup_lon", DataType::Float64, false),
        Field::new("dropoff_lat", DataType::Float64, false),
        Field::new("dropoff_lon", DataType::Float64, false),
        Field::new("pickup_datetime", DataType::Utf8, false),
    ]));
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from_iter_values(trips.iter().map(|t| t.pickup.lat()))),
        Arc::new(Float64Array::from_iter_values(trips.iter().map(|t| t.pickup.lng()))),
        Arc::new(Float64Array::from_iter_values(trips.iter().map(|t| t.dropoff.lat()))),
        Arc::new(Float64Array::from_iter_values(trips.iter().map(|t| t.dropoff.lng()))),
        Arc::new(StringArray::from_iter_values(trips.iter().map(|t| t.at.as_str()))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), arrays).expect("batch");
    let file = File::create(path).expect("create demand file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
    writer.write(&batch).expect("write batch");
    writer.close().expect("close");
}
