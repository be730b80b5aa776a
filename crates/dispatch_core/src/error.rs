//! Error taxonomy for the dispatch simulation.
//!
//! Configuration and data problems are fatal and surface before the first tick.
//! Routing failures are recoverable per call and never leave a tick. Invariant
//! violations mean the core logic itself is broken and abort the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::ecs::{BookingId, BookingStatus, VehicleId, VehicleStatus};

/// Top-level error returned by engine construction and [`crate::engine::Engine::run`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("internal fault: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("export error: {0}")]
    Export(#[from] ExportError),
}

/// Missing or invalid configuration. Always raised before the simulation starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid option `{option}`: {reason}")]
    InvalidOption { option: &'static str, reason: String },

    #[error("`{option}` refers to unknown {kind} `{name}`")]
    UnknownStrategy {
        option: &'static str,
        kind: &'static str,
        name: String,
    },

    #[error("`{option}` points to missing file {path}")]
    MissingFile { option: &'static str, path: PathBuf },
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidOption {
            option,
            reason: reason.into(),
        }
    }
}

/// Malformed input data that cannot be recovered by skipping a single record.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid GeoJSON in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: Box<geojson::Error>,
    },

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("demand file {path}: {reason}")]
    Demand { path: PathBuf, reason: String },

    #[error("demand file {path}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("demand file {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },
}

/// Failure of a single route estimate. Recoverable: the caller retries next tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// The routing backend could not be reached, timed out or answered garbage.
    #[error("routing service unavailable: {0}")]
    Unavailable(String),

    /// The backend answered, and there is no route between the two points.
    #[error("no route exists")]
    NoRoute,
}

impl RoutingError {
    /// True for failures that should abort the current match attempt.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RoutingError::Unavailable(_))
    }
}

/// Broken core invariant. Indicates a bug, not bad input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("booking {booking:?} cannot move from {from:?} to {to:?}")]
    BookingTransition {
        booking: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("vehicle {vehicle:?} cannot move from {from:?} to {to:?}")]
    VehicleTransition {
        vehicle: VehicleId,
        from: VehicleStatus,
        to: VehicleStatus,
    },

    #[error("vehicle {vehicle:?} assigned more than once in a tick")]
    DoubleAssignment { vehicle: VehicleId },

    #[error("route duration {duration_secs} is negative or not finite")]
    InvalidDuration { duration_secs: f64 },

    #[error("{0}")]
    Missing(String),
}

/// Failure writing the trace or booking table.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("unsupported output extension for {0} (expected .csv or .parquet)")]
    UnsupportedFormat(PathBuf),
}
