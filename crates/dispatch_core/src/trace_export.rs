//! Writes a finished run to disk.
//!
//! The configured output path receives the event trace. A sibling file named
//! `<stem>_bookings.<ext>` receives one lifecycle row per booking. The format
//! follows the extension: `.csv` or `.parquet`.

mod csv_format;
mod parquet_format;
mod utils;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ExportError;
use crate::telemetry::SimulationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Ok(OutputFormat::Csv),
            Some("parquet") => Ok(OutputFormat::Parquet),
            _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Files written by [`write_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub trace: PathBuf,
    pub bookings: PathBuf,
}

/// `out/trace.csv` -> `out/trace_bookings.csv`.
pub fn bookings_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}_bookings");
    if let Some(ext) = output.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    output.with_file_name(name)
}

pub fn write_report(report: &SimulationReport, output: &Path) -> Result<ExportPaths, ExportError> {
    let format = OutputFormat::from_path(output)?;
    let paths = ExportPaths {
        trace: output.to_path_buf(),
        bookings: bookings_path(output),
    };
    match format {
        OutputFormat::Csv => {
            csv_format::write_trace_csv(&paths.trace, report)?;
            csv_format::write_bookings_csv(&paths.bookings, report)?;
        }
        OutputFormat::Parquet => {
            parquet_format::write_trace_parquet(&paths.trace, report)?;
            parquet_format::write_bookings_parquet(&paths.bookings, report)?;
        }
    }
    info!(
        trace = %paths.trace.display(),
        bookings = %paths.bookings.display(),
        events = report.trace.len(),
        rows = report.bookings.len(),
        "wrote simulation output"
    );
    Ok(paths)
}
