use super::types::{IdleVehicle, MatchOutcome, PendingBooking};

/// Trait for dispatch solvers that pair pending bookings with idle vehicles.
///
/// Called once per tick. A matcher only reads the views it is given and proposes
/// assignments; the engine commits them. Every vehicle and every booking appears
/// in at most one proposed assignment.
pub trait Matcher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `pending` is ordered by `(request_time, id)`, `idle` by vehicle id.
    fn match_bookings(&self, pending: &[PendingBooking], idle: &[IdleVehicle]) -> MatchOutcome;
}
