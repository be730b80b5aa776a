//! TOML simulation configuration.
//!
//! ```toml
//! geofence = "geofence.geojson"
//! demand_file = "demand.parquet"
//!
//! [fleet]
//! stations = "stations.geojson"
//! vehicles = 50
//! router = "linear"
//!
//! [bookings]
//! max_pending_time = 10       # minutes
//! bookings_per_hour = 200     # optional
//!
//! [simulation]
//! duration = 120              # minutes
//! starting_time = "2019-02-01 08:00:00"
//! resolution = 9
//! map_match = false
//! demand_seed = 1
//! fleet_seed = 2
//! clock_step = 10             # seconds
//! output = "trace.csv"
//!
//! [greedy_matcher]
//! search_radius = 5           # minutes of estimated pickup time
//! router = "linear"
//!
//! [linear]
//! speed = 25                  # km/h
//! ```
//!
//! Relative paths resolve against the directory holding the config file.
//! [`Config::validate`] checks every option and input file before anything is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use h3o::Resolution;
use serde::Deserialize;

use crate::clock::{ONE_MIN_MS, ONE_SEC_MS};
use crate::demand::parse_timestamp;
use crate::error::ConfigError;
use crate::geofence::OutOfBoundsPolicy;
use crate::matching::SolverKind;
use crate::routing::RouterKind;

pub const GREEDY_MATCHER: &str = "greedy_matcher";
pub const BATCH_MATCHER: &str = "batch_matcher";
pub const LINEAR_ROUTER: &str = "linear";
pub const OSRM_ROUTER: &str = "osrm";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub geofence: PathBuf,
    pub demand_file: PathBuf,
    pub fleet: FleetConfig,
    pub bookings: BookingsConfig,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub greedy_matcher: Option<SolverConfig>,
    #[serde(default)]
    pub batch_matcher: Option<SolverConfig>,
    #[serde(default)]
    pub linear: Option<LinearConfig>,
    #[serde(default)]
    pub osrm: Option<OsrmConfig>,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    pub stations: PathBuf,
    pub vehicles: usize,
    pub router: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingsConfig {
    /// Minutes a booking may stay pending before it expires.
    pub max_pending_time: f64,
    #[serde(default)]
    pub bookings_per_hour: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Minutes.
    pub duration: f64,
    pub starting_time: String,
    pub resolution: u8,
    #[serde(default)]
    pub map_match: bool,
    pub demand_seed: u64,
    pub fleet_seed: u64,
    /// Seconds.
    pub clock_step: f64,
    pub output: PathBuf,
    #[serde(default = "default_solver")]
    pub solver: String,
    #[serde(default)]
    pub out_of_bounds: OutOfBoundsPolicy,
}

/// Options shared by every solver block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Upper bound on the estimated pickup duration, in minutes. A time bound
    /// despite the name.
    pub search_radius: f64,
    pub router: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearConfig {
    /// km/h.
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsrmConfig {
    pub server: String,
    /// Seconds per request.
    #[serde(default = "default_osrm_timeout")]
    pub timeout: u64,
    #[serde(default = "default_osrm_cache_size")]
    pub cache_size: usize,
}

fn default_solver() -> String {
    GREEDY_MATCHER.to_string()
}

fn default_osrm_timeout() -> u64 {
    3
}

fn default_osrm_cache_size() -> usize {
    20_000
}

fn minutes_to_ms(minutes: f64) -> u64 {
    (minutes * ONE_MIN_MS as f64).round() as u64
}

fn positive(option: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(option, format!("must be a positive number, got {value}")))
    }
}

fn non_negative(option: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(option, format!("must be zero or positive, got {value}")))
    }
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let config = Self::parse(&raw, path, base_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating. `origin` is only used in error messages.
    pub fn parse(raw: &str, origin: &Path, base_dir: PathBuf) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.base_dir = base_dir;
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn geofence_path(&self) -> PathBuf {
        self.resolve(&self.geofence)
    }

    pub fn demand_path(&self) -> PathBuf {
        self.resolve(&self.demand_file)
    }

    pub fn stations_path(&self) -> PathBuf {
        self.resolve(&self.fleet.stations)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.simulation.output)
    }

    pub fn starting_time(&self) -> Result<NaiveDateTime, ConfigError> {
        parse_timestamp(&self.simulation.starting_time).ok_or_else(|| {
            ConfigError::invalid(
                "simulation.starting_time",
                format!(
                    "`{}` is not a `YYYY-MM-DD HH:MM:SS` timestamp",
                    self.simulation.starting_time
                ),
            )
        })
    }

    pub fn resolution(&self) -> Result<Resolution, ConfigError> {
        Resolution::try_from(self.simulation.resolution).map_err(|_| {
            ConfigError::invalid(
                "simulation.resolution",
                format!("{} is not an H3 resolution (0..=15)", self.simulation.resolution),
            )
        })
    }

    pub fn duration_ms(&self) -> u64 {
        minutes_to_ms(self.simulation.duration)
    }

    pub fn clock_step_ms(&self) -> u64 {
        (self.simulation.clock_step * ONE_SEC_MS as f64).round() as u64
    }

    pub fn max_pending_ms(&self) -> u64 {
        minutes_to_ms(self.bookings.max_pending_time)
    }

    /// Router descriptor for a router name used by `fleet.router` or a solver block.
    pub fn router_kind(&self, option: &'static str, name: &str) -> Result<RouterKind, ConfigError> {
        match name {
            LINEAR_ROUTER => {
                let linear = self
                    .linear
                    .as_ref()
                    .ok_or_else(|| ConfigError::invalid("linear", "router `linear` is used but `[linear]` is missing"))?;
                Ok(RouterKind::Linear {
                    speed_kmh: linear.speed,
                })
            }
            OSRM_ROUTER => {
                let osrm = self
                    .osrm
                    .as_ref()
                    .ok_or_else(|| ConfigError::invalid("osrm", "router `osrm` is used but `[osrm]` is missing"))?;
                Ok(RouterKind::Osrm {
                    server: osrm.server.clone(),
                    timeout_secs: osrm.timeout,
                    cache_size: osrm.cache_size,
                })
            }
            other => Err(ConfigError::UnknownStrategy {
                option,
                kind: "router",
                name: other.to_string(),
            }),
        }
    }

    /// The selected solver and its option block.
    pub fn solver(&self) -> Result<(SolverKind, &SolverConfig), ConfigError> {
        let (kind, block) = match self.simulation.solver.as_str() {
            GREEDY_MATCHER => (SolverKind::Greedy, self.greedy_matcher.as_ref()),
            BATCH_MATCHER => (SolverKind::Batch, self.batch_matcher.as_ref()),
            other => {
                return Err(ConfigError::UnknownStrategy {
                    option: "simulation.solver",
                    kind: "solver",
                    name: other.to_string(),
                })
            }
        };
        let block = block.ok_or_else(|| {
            ConfigError::invalid(
                "simulation.solver",
                format!("solver `{}` has no `[{}]` block", self.simulation.solver, self.simulation.solver),
            )
        })?;
        Ok((kind, block))
    }

    /// Check every option and the existence of every input file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("simulation.duration", self.simulation.duration)?;
        positive("simulation.clock_step", self.simulation.clock_step)?;
        if self.clock_step_ms() == 0 {
            return Err(ConfigError::invalid(
                "simulation.clock_step",
                "must be at least one millisecond",
            ));
        }
        non_negative("bookings.max_pending_time", self.bookings.max_pending_time)?;
        if let Some(per_hour) = self.bookings.bookings_per_hour {
            non_negative("bookings.bookings_per_hour", per_hour)?;
        }
        self.starting_time()?;
        self.resolution()?;

        if let Some(linear) = &self.linear {
            positive("linear.speed", linear.speed)?;
        }
        if let Some(osrm) = &self.osrm {
            if osrm.server.trim().is_empty() {
                return Err(ConfigError::invalid("osrm.server", "must not be empty"));
            }
            if osrm.timeout == 0 {
                return Err(ConfigError::invalid("osrm.timeout", "must be at least one second"));
            }
        }

        self.router_kind("fleet.router", &self.fleet.router)?;
        let (_, solver) = self.solver()?;
        non_negative("search_radius", solver.search_radius)?;
        self.router_kind("router", &solver.router)?;

        if self.simulation.map_match && self.osrm.is_none() {
            return Err(ConfigError::invalid(
                "simulation.map_match",
                "map matching needs an `[osrm]` block",
            ));
        }

        let output = self.output_path();
        match output.extension().and_then(|ext| ext.to_str()) {
            Some("csv") | Some("parquet") => {}
            _ => {
                return Err(ConfigError::invalid(
                    "simulation.output",
                    format!("{} must end in .csv or .parquet", output.display()),
                ))
            }
        }

        for (option, path) in [
            ("geofence", self.geofence_path()),
            ("demand_file", self.demand_path()),
            ("fleet.stations", self.stations_path()),
        ] {
            if !path.is_file() {
                return Err(ConfigError::MissingFile { option, path });
            }
        }
        Ok(())
    }
}
