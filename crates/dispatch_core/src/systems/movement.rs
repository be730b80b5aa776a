//! Movement system: advances every busy vehicle to the end of the current tick.
//!
//! A vehicle follows its router-provided route at the route's own timing. Arrivals
//! are stamped with the exact arrival time, so one tick may carry a vehicle through
//! pickup and dropoff. The dropoff leg is estimated by the fleet router at pickup;
//! if that fails the vehicle waits at the pickup point and retries every tick.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::clock::SimulationClock;
use crate::ecs::{Booking, BookingStatus, Vehicle, VehicleId, VehicleStatus};
use crate::error::{InvariantViolation, RoutingError};
use crate::queue::BookingIndex;
use crate::routing::{FleetRouter, Route};
use crate::systems::Faults;
use crate::telemetry::{LegProgress, Trace, TraceEvent, TraceEventKind};

/// Everything one vehicle needs to make progress within the tick.
struct Leg<'a> {
    now: u64,
    horizon: u64,
    router: &'a FleetRouter,
    events: &'a mut Vec<TraceEvent>,
    faults: &'a mut Faults,
}

impl Leg<'_> {
    fn dropoff_route(&mut self, vehicle: &Vehicle, booking: &Booking, at: u64) -> Option<Route> {
        match self.router.0.estimate(vehicle.position, booking.destination) {
            Ok(route) => Some(route),
            Err(error) => {
                self.routing_failed(vehicle, booking, at, &error);
                None
            }
        }
    }

    fn routing_failed(&mut self, vehicle: &Vehicle, booking: &Booking, at: u64, error: &RoutingError) {
        warn!(vehicle = %vehicle.id, booking = %booking.id, %error, "dropoff route unavailable, retrying next tick");
        self.events.push(
            TraceEvent::new(at, TraceEventKind::RoutingFailed)
                .booking(booking.id, booking.status)
                .vehicle(vehicle.id, vehicle.status)
                .at(vehicle.position)
                .detail(format!("dropoff route: {error}")),
        );
    }

    /// `leg` is the leg that just ended.
    fn state_changed(&mut self, vehicle: &Vehicle, booking: &Booking, at: u64, leg: Option<LegProgress>) {
        self.events.push(
            TraceEvent::new(at, TraceEventKind::VehicleStateChanged)
                .vehicle(vehicle.id, vehicle.status)
                .booking(booking.id, booking.status)
                .at(vehicle.position)
                .leg(leg),
        );
    }

    /// Drives `vehicle` until it is idle, waiting, or still on the road at `horizon`.
    fn drive(&mut self, vehicle: &mut Vehicle, booking: &mut Booking) {
        let start = vehicle.position;
        let mut retried = false;
        loop {
            match vehicle.status {
                VehicleStatus::Idle => break,

                VehicleStatus::EnRoutePickup => {
                    let Some(arrival) = arrives_by(vehicle, self.horizon) else {
                        vehicle.advance(self.horizon);
                        break;
                    };
                    vehicle.advance(arrival);
                    let pickup_leg = vehicle.leg_progress(arrival);
                    if self.faults.record(booking.pick_up(arrival)).is_none() {
                        break;
                    }
                    self.events.push(
                        TraceEvent::new(arrival, TraceEventKind::BookingPickedUp)
                            .booking(booking.id, booking.status)
                            .vehicle(vehicle.id, VehicleStatus::EnRouteDropoff)
                            .at(vehicle.position),
                    );
                    let route = self.dropoff_route(vehicle, booking, arrival);
                    // A failed estimate at pickup counts as this tick's attempt.
                    retried = route.is_none();
                    if self.faults.record(vehicle.begin_dropoff(route, arrival)).is_none() {
                        break;
                    }
                    self.state_changed(vehicle, booking, arrival, pickup_leg);
                }

                VehicleStatus::EnRouteDropoff => {
                    if vehicle.route.is_none() {
                        if retried {
                            break;
                        }
                        retried = true;
                        let Some(route) = self.dropoff_route(vehicle, booking, self.now) else {
                            break;
                        };
                        if self.faults.record(vehicle.set_route(route, self.now)).is_none() {
                            break;
                        }
                    }
                    let Some(arrival) = arrives_by(vehicle, self.horizon) else {
                        vehicle.advance(self.horizon);
                        break;
                    };
                    vehicle.advance(arrival);
                    let dropoff_leg = vehicle.leg_progress(arrival);
                    if self.faults.record(booking.complete(arrival)).is_none() {
                        break;
                    }
                    if self.faults.record(vehicle.finish_trip()).is_none() {
                        break;
                    }
                    self.events.push(
                        TraceEvent::new(arrival, TraceEventKind::BookingCompleted)
                            .booking(booking.id, BookingStatus::Completed)
                            .vehicle(vehicle.id, VehicleStatus::Idle)
                            .at(vehicle.position),
                    );
                    self.state_changed(vehicle, booking, arrival, dropoff_leg);
                }
            }
        }

        if vehicle.position != start && !vehicle.is_idle() {
            self.events.push(
                TraceEvent::new(self.horizon, TraceEventKind::VehicleMoved)
                    .vehicle(vehicle.id, vehicle.status)
                    .booking(booking.id, booking.status)
                    .at(vehicle.position)
                    .leg(vehicle.leg_progress(self.horizon)),
            );
        }
    }
}

/// Arrival time of the vehicle's current route, if it falls within `horizon`.
fn arrives_by(vehicle: &Vehicle, horizon: u64) -> Option<u64> {
    let arrival = vehicle.route.as_ref()?.arrival_time();
    (arrival <= horizon).then_some(arrival)
}

/// Moves every vehicle with a booking from `now` to the end of the tick window.
/// Events of one tick are emitted in time order (ties by vehicle id).
#[allow(clippy::too_many_arguments)]
pub fn movement_system(
    clock: Res<SimulationClock>,
    router: Res<FleetRouter>,
    index: Res<BookingIndex>,
    mut vehicles: Query<(Entity, &mut Vehicle)>,
    mut bookings: Query<&mut Booking>,
    mut trace: ResMut<Trace>,
    mut faults: ResMut<Faults>,
) {
    let now = clock.now();
    let horizon = now.saturating_add(clock.step_ms()).min(clock.end_ms());

    let mut busy: Vec<(Entity, VehicleId)> = vehicles
        .iter()
        .filter(|(_, vehicle)| !vehicle.is_idle())
        .map(|(entity, vehicle)| (entity, vehicle.id))
        .collect();
    busy.sort_by_key(|(_, id)| *id);

    let mut events = Vec::new();
    for (entity, _) in busy {
        let Ok((_, mut vehicle)) = vehicles.get_mut(entity) else {
            continue;
        };
        let Some(booking_entity) = vehicle.current_booking.and_then(|id| index.get(id)) else {
            faults.raise(InvariantViolation::Missing(format!(
                "busy vehicle {} has no booking",
                vehicle.id
            )));
            continue;
        };
        let Ok(mut booking) = bookings.get_mut(booking_entity) else {
            faults.raise(InvariantViolation::Missing(format!(
                "booking of vehicle {} has no entity",
                vehicle.id
            )));
            continue;
        };

        let mut leg = Leg {
            now,
            horizon,
            router: &router,
            events: &mut events,
            faults: &mut faults,
        };
        leg.drive(&mut vehicle, &mut booking);
    }

    // Stable: same-time events keep vehicle order.
    events.sort_by_key(|event| event.time_ms);
    trace.events.extend(events);
}
