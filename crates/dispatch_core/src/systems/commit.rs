use std::collections::HashSet;

use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::debug;

use crate::clock::SimulationClock;
use crate::ecs::{Booking, BookingStatus, Vehicle, VehicleStatus};
use crate::error::InvariantViolation;
use crate::fleet::VehicleIndex;
use crate::queue::{BookingIndex, BookingQueue};
use crate::systems::{Faults, TickAssignments};
use crate::telemetry::{Trace, TraceEvent, TraceEventKind};

/// Commits the matcher's proposals: booking pending -> assigned, vehicle
/// idle -> en route to pickup on the proposed route.
///
/// A vehicle proposed twice, a non-idle vehicle or a non-pending booking is an
/// invariant violation and the pair is not committed.
#[allow(clippy::too_many_arguments)]
pub fn commit_assignments_system(
    clock: Res<SimulationClock>,
    mut assignments: ResMut<TickAssignments>,
    mut queue: ResMut<BookingQueue>,
    booking_index: Res<BookingIndex>,
    vehicle_index: Res<VehicleIndex>,
    mut bookings: Query<&mut Booking>,
    mut vehicles: Query<&mut Vehicle>,
    mut trace: ResMut<Trace>,
    mut faults: ResMut<Faults>,
) {
    let now = clock.now();
    let mut used = HashSet::new();

    for assignment in assignments.0.drain(..) {
        if !used.insert(assignment.vehicle) {
            faults.raise(InvariantViolation::DoubleAssignment {
                vehicle: assignment.vehicle,
            });
            continue;
        }

        let (Some(booking_entity), Some(vehicle_entity)) = (
            booking_index.get(assignment.booking),
            vehicle_index.get(assignment.vehicle),
        ) else {
            faults.raise(InvariantViolation::Missing(format!(
                "assignment of booking {} to vehicle {} names an unknown entity",
                assignment.booking, assignment.vehicle
            )));
            continue;
        };
        let (Ok(mut booking), Ok(mut vehicle)) = (
            bookings.get_mut(booking_entity),
            vehicles.get_mut(vehicle_entity),
        ) else {
            faults.raise(InvariantViolation::Missing(format!(
                "booking {} or vehicle {} has no component",
                assignment.booking, assignment.vehicle
            )));
            continue;
        };

        if booking.status != BookingStatus::Pending {
            faults.raise(InvariantViolation::BookingTransition {
                booking: booking.id,
                from: booking.status,
                to: BookingStatus::Assigned,
            });
            continue;
        }

        let eta_secs = assignment.pickup_eta_secs();
        if faults
            .record(vehicle.dispatch(booking.id, assignment.pickup, now))
            .is_none()
        {
            continue;
        }
        if faults.record(booking.assign(vehicle.id, now)).is_none() {
            continue;
        }
        if queue.take(booking.id, booking.request_time).is_none() {
            faults.raise(InvariantViolation::Missing(format!(
                "assigned booking {} was not in the pending queue",
                booking.id
            )));
            continue;
        }

        debug!(booking = %booking.id, vehicle = %vehicle.id, eta_secs, "booking assigned");
        trace.push(
            TraceEvent::new(now, TraceEventKind::BookingAssigned)
                .booking(booking.id, BookingStatus::Assigned)
                .vehicle(vehicle.id, VehicleStatus::EnRoutePickup)
                .at(vehicle.position)
                .pickup_eta(eta_secs),
        );
        trace.push(
            TraceEvent::new(now, TraceEventKind::VehicleStateChanged)
                .vehicle(vehicle.id, VehicleStatus::EnRoutePickup)
                .booking(booking.id, BookingStatus::Assigned)
                .at(vehicle.position)
                .leg(vehicle.leg_progress(now)),
        );
    }
}
