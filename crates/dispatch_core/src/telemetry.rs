//! Trace / KPIs: the append-only event trace, per-booking lifecycles and run summary.

use bevy_ecs::prelude::Resource;
use chrono::NaiveDateTime;
use h3o::{LatLng, Resolution};

use crate::demand::DemandLoadStats;
use crate::ecs::{Booking, BookingId, BookingStatus, VehicleId, VehicleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEventKind {
    BookingRequested,
    BookingExpired,
    BookingAssigned,
    VehicleStateChanged,
    VehicleMoved,
    BookingPickedUp,
    BookingCompleted,
    RoutingFailed,
    /// Emitted once per booking still pending or assigned when the run ends.
    BookingUnresolved,
}

impl TraceEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceEventKind::BookingRequested => "booking_requested",
            TraceEventKind::BookingExpired => "booking_expired",
            TraceEventKind::BookingAssigned => "booking_assigned",
            TraceEventKind::VehicleStateChanged => "vehicle_state_changed",
            TraceEventKind::VehicleMoved => "vehicle_moved",
            TraceEventKind::BookingPickedUp => "booking_picked_up",
            TraceEventKind::BookingCompleted => "booking_completed",
            TraceEventKind::RoutingFailed => "routing_failed",
            TraceEventKind::BookingUnresolved => "booking_unresolved",
        }
    }
}

/// The route leg a vehicle event refers to and how far along it the vehicle got.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegProgress {
    pub origin: LatLng,
    pub destination: LatLng,
    /// Kilometres driven on this leg so far.
    pub traveled_km: f64,
}

/// One immutable trace record. `time_ms` is simulation time since the start.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub time_ms: u64,
    pub kind: TraceEventKind,
    pub booking: Option<BookingId>,
    pub vehicle: Option<VehicleId>,
    pub position: Option<LatLng>,
    pub vehicle_state: Option<VehicleStatus>,
    pub booking_status: Option<BookingStatus>,
    pub pickup_eta_secs: Option<f64>,
    pub leg: Option<LegProgress>,
    pub detail: Option<String>,
}

impl TraceEvent {
    pub fn new(time_ms: u64, kind: TraceEventKind) -> Self {
        Self {
            time_ms,
            kind,
            booking: None,
            vehicle: None,
            position: None,
            vehicle_state: None,
            booking_status: None,
            pickup_eta_secs: None,
            leg: None,
            detail: None,
        }
    }

    pub fn booking(mut self, id: BookingId, status: BookingStatus) -> Self {
        self.booking = Some(id);
        self.booking_status = Some(status);
        self
    }

    pub fn vehicle(mut self, id: VehicleId, state: VehicleStatus) -> Self {
        self.vehicle = Some(id);
        self.vehicle_state = Some(state);
        self
    }

    pub fn at(mut self, position: LatLng) -> Self {
        self.position = Some(position);
        self
    }

    pub fn pickup_eta(mut self, secs: f64) -> Self {
        self.pickup_eta_secs = Some(secs);
        self
    }

    pub fn leg(mut self, leg: Option<LegProgress>) -> Self {
        self.leg = leg;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Collects the trace. Insert as a resource; systems append in emission order.
#[derive(Debug, Default, Resource)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn count(&self, kind: TraceEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Final state of one booking, one row of the bookings table.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingLifecycle {
    pub id: BookingId,
    pub status: BookingStatus,
    pub vehicle: Option<VehicleId>,
    pub pickup: LatLng,
    pub dropoff: LatLng,
    /// True once `pickup`/`dropoff` have been snapped onto the road network.
    pub map_matched: bool,
    pub requested_at: u64,
    pub assigned_at: Option<u64>,
    pub picked_up_at: Option<u64>,
    pub dropped_off_at: Option<u64>,
    pub expired_at: Option<u64>,
}

impl BookingLifecycle {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            status: booking.status,
            vehicle: booking.assigned_vehicle,
            pickup: booking.origin,
            dropoff: booking.destination,
            map_matched: false,
            requested_at: booking.request_time,
            assigned_at: booking.assigned_at,
            picked_up_at: booking.pickup_time,
            dropped_off_at: booking.dropoff_time,
            expired_at: booking.expired_at,
        }
    }

    /// Time from request to pickup.
    pub fn wait_ms(&self) -> Option<u64> {
        self.picked_up_at
            .map(|at| at.saturating_sub(self.requested_at))
    }

    /// Time from pickup to dropoff.
    pub fn ride_ms(&self) -> Option<u64> {
        Some(self.dropped_off_at?.saturating_sub(self.picked_up_at?))
    }
}

/// Aggregated counts for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationSummary {
    pub requested: usize,
    pub assigned: usize,
    pub completed: usize,
    pub expired: usize,
    pub unresolved_pending: usize,
    pub unresolved_assigned: usize,
    pub routing_failures: usize,
    /// Pickup or dropoff points that kept their raw coordinate after map matching.
    pub map_match_failures: usize,
    pub ticks: u64,
    pub mean_wait_secs: Option<f64>,
    pub mean_ride_secs: Option<f64>,
}

fn mean_secs(values: impl Iterator<Item = u64>) -> Option<f64> {
    let (sum, n) = values.fold((0u64, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum as f64 / n as f64 / 1000.0)
}

impl SimulationSummary {
    pub fn from_run(trace: &Trace, bookings: &[BookingLifecycle], ticks: u64) -> Self {
        let with_status = |status| bookings.iter().filter(|b| b.status == status).count();
        Self {
            requested: bookings.len(),
            assigned: bookings.iter().filter(|b| b.assigned_at.is_some()).count(),
            completed: with_status(BookingStatus::Completed),
            expired: with_status(BookingStatus::Expired),
            unresolved_pending: with_status(BookingStatus::Pending),
            unresolved_assigned: with_status(BookingStatus::Assigned),
            routing_failures: trace.count(TraceEventKind::RoutingFailed),
            map_match_failures: 0,
            ticks,
            mean_wait_secs: mean_secs(bookings.iter().filter_map(BookingLifecycle::wait_ms)),
            mean_ride_secs: mean_secs(bookings.iter().filter_map(BookingLifecycle::ride_ms)),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Wall-clock time of simulation time 0.
    pub epoch: NaiveDateTime,
    /// H3 resolution used for the trace `cell` column.
    pub resolution: Resolution,
    pub summary: SimulationSummary,
    pub trace: Vec<TraceEvent>,
    /// Ordered by booking id.
    pub bookings: Vec<BookingLifecycle>,
    pub demand: Option<DemandLoadStats>,
}

impl SimulationReport {
    pub fn datetime_at(&self, time_ms: u64) -> NaiveDateTime {
        self.epoch + chrono::Duration::milliseconds(time_ms as i64)
    }

    pub fn booking(&self, id: BookingId) -> Option<&BookingLifecycle> {
        self.bookings
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bookings[i])
    }
}
