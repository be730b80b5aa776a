use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::debug;

use crate::clock::SimulationClock;
use crate::ecs::{Booking, BookingStatus};
use crate::error::InvariantViolation;
use crate::queue::BookingQueue;
use crate::systems::{BookingSettings, Faults};
use crate::telemetry::{Trace, TraceEvent, TraceEventKind};

/// Expires every pending booking with `request_time + max_pending_ms < now`.
/// Runs before matching so the matcher only sees eligible bookings.
pub fn expire_bookings_system(
    clock: Res<SimulationClock>,
    settings: Res<BookingSettings>,
    mut queue: ResMut<BookingQueue>,
    mut bookings: Query<&mut Booking>,
    mut trace: ResMut<Trace>,
    mut faults: ResMut<Faults>,
) {
    let now = clock.now();
    for entry in queue.expire_overdue(now, settings.max_pending_ms) {
        let Ok(mut booking) = bookings.get_mut(entry.entity) else {
            faults.raise(InvariantViolation::Missing(format!(
                "queued booking {} has no entity",
                entry.id
            )));
            continue;
        };
        if faults.record(booking.expire(now)).is_none() {
            continue;
        }
        debug!(booking = %booking.id, "booking expired");
        trace.push(
            TraceEvent::new(now, TraceEventKind::BookingExpired)
                .booking(booking.id, BookingStatus::Expired)
                .at(booking.origin),
        );
    }
}
