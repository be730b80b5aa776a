use bevy_ecs::prelude::{Commands, Res, ResMut};

use crate::clock::SimulationClock;
use crate::demand::DemandFeed;
use crate::ecs::{Booking, BookingStatus};
use crate::queue::{BookingIndex, BookingQueue};
use crate::telemetry::{Trace, TraceEvent, TraceEventKind};

/// Admits every request with `request_time <= now` into the booking queue.
///
/// Bookings are spawned through `Commands`; the schedule applies them before expiry runs.
pub fn admit_demand_system(
    mut commands: Commands,
    clock: Res<SimulationClock>,
    mut feed: ResMut<DemandFeed>,
    mut queue: ResMut<BookingQueue>,
    mut index: ResMut<BookingIndex>,
    mut trace: ResMut<Trace>,
) {
    let now = clock.now();
    while feed.0.peek_request_time().is_some_and(|at| at <= now) {
        let Some(request) = feed.0.next_request() else {
            break;
        };
        let booking = Booking::from_request(&request);
        let entity = commands.spawn(booking).id();
        index.0.insert(request.id, entity);
        queue.admit(request.id, request.request_time, entity);
        trace.push(
            TraceEvent::new(now, TraceEventKind::BookingRequested)
                .booking(request.id, BookingStatus::Pending)
                .at(request.origin),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{Schedule, World};
    use chrono::NaiveDateTime;

    use crate::clock::ONE_SEC_MS;
    use crate::demand::{BookingRequest, ReplayDemand};
    use crate::ecs::BookingId;
    use crate::test_helpers::{test_location, test_location_offset};

    fn request(id: u64, request_time: u64) -> BookingRequest {
        BookingRequest {
            id: BookingId(id),
            origin: test_location(),
            destination: test_location_offset(0.01, 0.0),
            request_time,
        }
    }

    #[test]
    fn admits_only_requests_due_by_now() {
        let epoch = NaiveDateTime::parse_from_str("2019-02-01 08:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("epoch");
        let mut world = World::new();
        world.insert_resource(SimulationClock::new(epoch, 10 * ONE_SEC_MS, 60 * ONE_SEC_MS));
        world.insert_resource(DemandFeed(Box::new(ReplayDemand::new(vec![
            request(0, 0),
            request(1, 0),
            request(2, 15 * ONE_SEC_MS),
        ]))));
        world.insert_resource(BookingQueue::default());
        world.insert_resource(BookingIndex::default());
        world.insert_resource(Trace::default());

        let mut schedule = Schedule::default();
        schedule.add_systems(admit_demand_system);
        schedule.run(&mut world);

        assert_eq!(world.resource::<BookingQueue>().len(), 2);
        assert_eq!(world.resource::<BookingIndex>().0.len(), 2);
        assert_eq!(world.query::<&Booking>().iter(&world).count(), 2);
        assert_eq!(world.resource::<DemandFeed>().0.remaining(), 1);

        world.resource_mut::<SimulationClock>().advance();
        world.resource_mut::<SimulationClock>().advance();
        schedule.run(&mut world);
        assert_eq!(world.resource::<BookingQueue>().len(), 3);
        assert_eq!(
            world.resource::<Trace>().count(TraceEventKind::BookingRequested),
            3
        );
    }
}
