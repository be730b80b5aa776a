use std::path::Path;

use crate::error::ExportError;
use crate::telemetry::SimulationReport;

use super::utils::{
    cell_of, create_file, format_datetime, round_km, secs, BOOKING_COLUMNS, TRACE_COLUMNS,
};

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One row per trace event. Missing fields are empty; `cell` is the H3 index in hex.
pub(super) fn write_trace_csv(path: &Path, report: &SimulationReport) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(create_file(path)?);
    wtr.write_record(TRACE_COLUMNS)?;

    for event in &report.trace {
        wtr.write_record([
            event.time_ms.to_string(),
            format_datetime(report.datetime_at(event.time_ms)),
            event.kind.as_str().to_string(),
            opt(event.booking),
            opt(event.vehicle),
            opt(event.position.map(|p| p.lat())),
            opt(event.position.map(|p| p.lng())),
            opt(event.position.map(|p| cell_of(p, report.resolution))),
            opt(event.vehicle_state.map(|s| s.as_str())),
            opt(event.booking_status.map(|s| s.as_str())),
            opt(event.pickup_eta_secs),
            opt(event.leg.map(|leg| leg.origin.lat())),
            opt(event.leg.map(|leg| leg.origin.lng())),
            opt(event.leg.map(|leg| leg.destination.lat())),
            opt(event.leg.map(|leg| leg.destination.lng())),
            opt(event.leg.map(|leg| round_km(leg.traveled_km))),
            event.detail.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub(super) fn write_bookings_csv(path: &Path, report: &SimulationReport) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(create_file(path)?);
    wtr.write_record(BOOKING_COLUMNS)?;

    for booking in &report.bookings {
        wtr.write_record([
            booking.id.to_string(),
            booking.status.as_str().to_string(),
            opt(booking.vehicle),
            format_datetime(report.datetime_at(booking.requested_at)),
            booking.requested_at.to_string(),
            opt(booking.assigned_at),
            opt(booking.picked_up_at),
            opt(booking.dropped_off_at),
            opt(booking.expired_at),
            opt(booking.wait_ms().map(secs)),
            opt(booking.ride_ms().map(secs)),
            booking.pickup.lat().to_string(),
            booking.pickup.lng().to_string(),
            booking.dropoff.lat().to_string(),
            booking.dropoff.lng().to_string(),
            booking.map_matched.to_string(),
        ])?;
    }

    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
