use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::Schema;

use crate::error::ExportError;
use crate::telemetry::SimulationReport;

use super::utils::{
    bool_field, cell_of, f64_field, format_datetime, nullable_f64_field, nullable_u64_field,
    nullable_utf8_field, round_km, secs, u64_field, utf8_field, write_record_batch, BOOKING_COLUMNS,
    TRACE_COLUMNS,
};

/// Same columns as the CSV trace; `cell` is stored as the raw H3 index.
pub(super) fn write_trace_parquet(path: &Path, report: &SimulationReport) -> Result<(), ExportError> {
    let events = &report.trace;
    let mut time_ms = Vec::with_capacity(events.len());
    let mut datetime = Vec::with_capacity(events.len());
    let mut event_kind = Vec::with_capacity(events.len());
    let mut booking_id = Vec::with_capacity(events.len());
    let mut vehicle_id = Vec::with_capacity(events.len());
    let mut lat = Vec::with_capacity(events.len());
    let mut lon = Vec::with_capacity(events.len());
    let mut cell = Vec::with_capacity(events.len());
    let mut vehicle_state = Vec::with_capacity(events.len());
    let mut booking_status = Vec::with_capacity(events.len());
    let mut pickup_eta_secs = Vec::with_capacity(events.len());
    let mut origin_lat = Vec::with_capacity(events.len());
    let mut origin_lon = Vec::with_capacity(events.len());
    let mut destination_lat = Vec::with_capacity(events.len());
    let mut destination_lon = Vec::with_capacity(events.len());
    let mut traveled_km = Vec::with_capacity(events.len());
    let mut detail = Vec::with_capacity(events.len());

    for event in events {
        time_ms.push(event.time_ms);
        datetime.push(format_datetime(report.datetime_at(event.time_ms)));
        event_kind.push(event.kind.as_str());
        booking_id.push(event.booking.map(|id| id.0));
        vehicle_id.push(event.vehicle.map(|id| id.0));
        lat.push(event.position.map(|p| p.lat()));
        lon.push(event.position.map(|p| p.lng()));
        cell.push(event.position.map(|p| u64::from(cell_of(p, report.resolution))));
        vehicle_state.push(event.vehicle_state.map(|s| s.as_str()));
        booking_status.push(event.booking_status.map(|s| s.as_str()));
        pickup_eta_secs.push(event.pickup_eta_secs);
        origin_lat.push(event.leg.map(|leg| leg.origin.lat()));
        origin_lon.push(event.leg.map(|leg| leg.origin.lng()));
        destination_lat.push(event.leg.map(|leg| leg.destination.lat()));
        destination_lon.push(event.leg.map(|leg| leg.destination.lng()));
        traveled_km.push(event.leg.map(|leg| round_km(leg.traveled_km)));
        detail.push(event.detail.clone());
    }

    let [
        c_time,
        c_datetime,
        c_event,
        c_booking,
        c_vehicle,
        c_lat,
        c_lon,
        c_cell,
        c_state,
        c_status,
        c_eta,
        c_origin_lat,
        c_origin_lon,
        c_destination_lat,
        c_destination_lon,
        c_traveled,
        c_detail,
    ] = TRACE_COLUMNS;
    let schema = Schema::new(vec![
        u64_field(c_time),
        utf8_field(c_datetime),
        utf8_field(c_event),
        nullable_u64_field(c_booking),
        nullable_u64_field(c_vehicle),
        nullable_f64_field(c_lat),
        nullable_f64_field(c_lon),
        nullable_u64_field(c_cell),
        nullable_utf8_field(c_state),
        nullable_utf8_field(c_status),
        nullable_f64_field(c_eta),
        nullable_f64_field(c_origin_lat),
        nullable_f64_field(c_origin_lon),
        nullable_f64_field(c_destination_lat),
        nullable_f64_field(c_destination_lon),
        nullable_f64_field(c_traveled),
        nullable_utf8_field(c_detail),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(time_ms)),
        Arc::new(StringArray::from(datetime)),
        Arc::new(StringArray::from(event_kind)),
        Arc::new(UInt64Array::from(booking_id)),
        Arc::new(UInt64Array::from(vehicle_id)),
        Arc::new(Float64Array::from(lat)),
        Arc::new(Float64Array::from(lon)),
        Arc::new(UInt64Array::from(cell)),
        Arc::new(StringArray::from(vehicle_state)),
        Arc::new(StringArray::from(booking_status)),
        Arc::new(Float64Array::from(pickup_eta_secs)),
        Arc::new(Float64Array::from(origin_lat)),
        Arc::new(Float64Array::from(origin_lon)),
        Arc::new(Float64Array::from(destination_lat)),
        Arc::new(Float64Array::from(destination_lon)),
        Arc::new(Float64Array::from(traveled_km)),
        Arc::new(StringArray::from(detail)),
    ];

    write_record_batch(path, schema, arrays)
}

pub(super) fn write_bookings_parquet(path: &Path, report: &SimulationReport) -> Result<(), ExportError> {
    let bookings = &report.bookings;
    let mut booking_id = Vec::with_capacity(bookings.len());
    let mut status = Vec::with_capacity(bookings.len());
    let mut vehicle_id = Vec::with_capacity(bookings.len());
    let mut requested_at = Vec::with_capacity(bookings.len());
    let mut requested_at_ms = Vec::with_capacity(bookings.len());
    let mut assigned_at_ms = Vec::with_capacity(bookings.len());
    let mut picked_up_at_ms = Vec::with_capacity(bookings.len());
    let mut dropped_off_at_ms = Vec::with_capacity(bookings.len());
    let mut expired_at_ms = Vec::with_capacity(bookings.len());
    let mut wait_secs = Vec::with_capacity(bookings.len());
    let mut ride_secs = Vec::with_capacity(bookings.len());
    let mut pickup_lat = Vec::with_capacity(bookings.len());
    let mut pickup_lon = Vec::with_capacity(bookings.len());
    let mut dropoff_lat = Vec::with_capacity(bookings.len());
    let mut dropoff_lon = Vec::with_capacity(bookings.len());
    let mut map_matched = Vec::with_capacity(bookings.len());

    for booking in bookings {
        booking_id.push(booking.id.0);
        status.push(booking.status.as_str());
        vehicle_id.push(booking.vehicle.map(|id| id.0));
        requested_at.push(format_datetime(report.datetime_at(booking.requested_at)));
        requested_at_ms.push(booking.requested_at);
        assigned_at_ms.push(booking.assigned_at);
        picked_up_at_ms.push(booking.picked_up_at);
        dropped_off_at_ms.push(booking.dropped_off_at);
        expired_at_ms.push(booking.expired_at);
        wait_secs.push(booking.wait_ms().map(secs));
        ride_secs.push(booking.ride_ms().map(secs));
        pickup_lat.push(booking.pickup.lat());
        pickup_lon.push(booking.pickup.lng());
        dropoff_lat.push(booking.dropoff.lat());
        dropoff_lon.push(booking.dropoff.lng());
        map_matched.push(booking.map_matched);
    }

    let schema = Schema::new(vec![
        u64_field(BOOKING_COLUMNS[0]),
        utf8_field(BOOKING_COLUMNS[1]),
        nullable_u64_field(BOOKING_COLUMNS[2]),
        utf8_field(BOOKING_COLUMNS[3]),
        u64_field(BOOKING_COLUMNS[4]),
        nullable_u64_field(BOOKING_COLUMNS[5]),
        nullable_u64_field(BOOKING_COLUMNS[6]),
        nullable_u64_field(BOOKING_COLUMNS[7]),
        nullable_u64_field(BOOKING_COLUMNS[8]),
        nullable_f64_field(BOOKING_COLUMNS[9]),
        nullable_f64_field(BOOKING_COLUMNS[10]),
        f64_field(BOOKING_COLUMNS[11]),
        f64_field(BOOKING_COLUMNS[12]),
        f64_field(BOOKING_COLUMNS[13]),
        f64_field(BOOKING_COLUMNS[14]),
        bool_field(BOOKING_COLUMNS[15]),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(booking_id)),
        Arc::new(StringArray::from(status)),
        Arc::new(UInt64Array::from(vehicle_id)),
        Arc::new(StringArray::from(requested_at)),
        Arc::new(UInt64Array::from(requested_at_ms)),
        Arc::new(UInt64Array::from(assigned_at_ms)),
        Arc::new(UInt64Array::from(picked_up_at_ms)),
        Arc::new(UInt64Array::from(dropped_off_at_ms)),
        Arc::new(UInt64Array::from(expired_at_ms)),
        Arc::new(Float64Array::from(wait_secs)),
        Arc::new(Float64Array::from(ride_secs)),
        Arc::new(Float64Array::from(pickup_lat)),
        Arc::new(Float64Array::from(pickup_lon)),
        Arc::new(Float64Array::from(dropoff_lat)),
        Arc::new(Float64Array::from(dropoff_lon)),
        Arc::new(BooleanArray::from(map_matched)),
    ];

    write_record_batch(path, schema, arrays)
}
