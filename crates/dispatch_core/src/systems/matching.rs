use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::debug;

use crate::clock::SimulationClock;
use crate::ecs::{Booking, BookingStatus, Vehicle};
use crate::error::InvariantViolation;
use crate::matching::{IdleVehicle, MatcherResource, PendingBooking};
use crate::queue::BookingQueue;
use crate::systems::{Faults, TickAssignments};
use crate::telemetry::{Trace, TraceEvent, TraceEventKind};

/// Runs the configured matcher over the pending queue and the idle fleet.
///
/// The matcher only sees read-only views; its proposals are stored in
/// [`TickAssignments`] for the commit system.
#[allow(clippy::too_many_arguments)]
pub fn matching_system(
    clock: Res<SimulationClock>,
    matcher: Res<MatcherResource>,
    queue: Res<BookingQueue>,
    bookings: Query<&Booking>,
    vehicles: Query<&Vehicle>,
    mut assignments: ResMut<TickAssignments>,
    mut trace: ResMut<Trace>,
    mut faults: ResMut<Faults>,
) {
    assignments.0.clear();
    if queue.is_empty() {
        return;
    }

    let mut pending: Vec<PendingBooking> = Vec::with_capacity(queue.len());
    for entry in queue.peek_pending() {
        let Ok(booking) = bookings.get(entry.entity) else {
            faults.raise(InvariantViolation::Missing(format!(
                "queued booking {} has no entity",
                entry.id
            )));
            continue;
        };
        pending.push(PendingBooking {
            id: booking.id,
            origin: booking.origin,
            request_time: booking.request_time,
        });
    }

    let mut idle: Vec<IdleVehicle> = vehicles
        .iter()
        .filter(|vehicle| vehicle.is_idle())
        .map(|vehicle| IdleVehicle {
            id: vehicle.id,
            position: vehicle.position,
        })
        .collect();
    idle.sort_by_key(|vehicle| vehicle.id);
    if idle.is_empty() {
        return;
    }

    let now = clock.now();
    let outcome = matcher.match_bookings(&pending, &idle);
    debug!(
        solver = matcher.name(),
        pending = pending.len(),
        idle = idle.len(),
        proposed = outcome.assignments.len(),
        "matching round"
    );

    for failure in outcome.failures {
        trace.push(
            TraceEvent::new(now, TraceEventKind::RoutingFailed)
                .booking(failure.booking, BookingStatus::Pending)
                .detail(format!("pickup estimate for vehicle {}: {}", failure.vehicle, failure.error)),
        );
    }
    assignments.0 = outcome.assignments;
}
