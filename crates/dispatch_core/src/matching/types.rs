use h3o::LatLng;

use crate::ecs::{BookingId, VehicleId};
use crate::error::RoutingError;
use crate::routing::Route;

/// Read-only view of a pending booking handed to a matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingBooking {
    pub id: BookingId,
    pub origin: LatLng,
    pub request_time: u64,
}

/// Read-only view of an idle vehicle handed to a matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleVehicle {
    pub id: VehicleId,
    pub position: LatLng,
}

/// A proposed (booking, vehicle) pair with the pickup route it was judged on.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub booking: BookingId,
    pub vehicle: VehicleId,
    pub pickup: Route,
}

impl Assignment {
    pub fn pickup_eta_secs(&self) -> f64 {
        self.pickup.duration_secs
    }
}

/// A route estimate that failed while matching. The booking stays pending.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFailure {
    pub booking: BookingId,
    pub vehicle: VehicleId,
    pub error: RoutingError,
}

/// Everything a matcher proposes for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub assignments: Vec<Assignment>,
    pub failures: Vec<MatchFailure>,
}
