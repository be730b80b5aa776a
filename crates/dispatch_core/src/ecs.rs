//! Entity components: bookings and vehicles, with their guarded state transitions.
//!
//! Both are owned by the engine's world. Every status change goes through a
//! method that checks the transition and reports an [`InvariantViolation`]
//! instead of silently accepting an out-of-order move.

use std::fmt;

use bevy_ecs::prelude::Component;
use h3o::LatLng;

use crate::demand::BookingRequest;
use crate::error::InvariantViolation;
use crate::routing::Route;
use crate::telemetry::LegProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BookingId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub u64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Assigned,
    Completed,
    Expired,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Assigned => "assigned",
            BookingStatus::Completed => "completed",
            BookingStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Expired)
    }

    fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Assigned)
                | (BookingStatus::Pending, BookingStatus::Expired)
                | (BookingStatus::Assigned, BookingStatus::Completed)
        )
    }
}

/// A ride request and its lifecycle timestamps (simulation ms).
#[derive(Debug, Clone, Component)]
pub struct Booking {
    pub id: BookingId,
    pub origin: LatLng,
    pub destination: LatLng,
    pub request_time: u64,
    pub status: BookingStatus,
    pub assigned_vehicle: Option<VehicleId>,
    pub assigned_at: Option<u64>,
    pub pickup_time: Option<u64>,
    pub dropoff_time: Option<u64>,
    pub expired_at: Option<u64>,
}

impl Booking {
    pub fn from_request(request: &BookingRequest) -> Self {
        Self {
            id: request.id,
            origin: request.origin,
            destination: request.destination,
            request_time: request.request_time,
            status: BookingStatus::Pending,
            assigned_vehicle: None,
            assigned_at: None,
            pickup_time: None,
            dropoff_time: None,
            expired_at: None,
        }
    }

    fn transition(&mut self, next: BookingStatus) -> Result<(), InvariantViolation> {
        if !self.status.can_transition_to(next) {
            return Err(InvariantViolation::BookingTransition {
                booking: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn assign(&mut self, vehicle: VehicleId, now: u64) -> Result<(), InvariantViolation> {
        self.transition(BookingStatus::Assigned)?;
        self.assigned_vehicle = Some(vehicle);
        self.assigned_at = Some(now);
        Ok(())
    }

    /// Records the pickup. The booking stays `Assigned` until dropoff.
    pub fn pick_up(&mut self, now: u64) -> Result<(), InvariantViolation> {
        if self.status != BookingStatus::Assigned || self.pickup_time.is_some() {
            return Err(InvariantViolation::Missing(format!(
                "booking {} picked up while {} (pickup_time {:?})",
                self.id,
                self.status.as_str(),
                self.pickup_time
            )));
        }
        self.pickup_time = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: u64) -> Result<(), InvariantViolation> {
        if self.pickup_time.is_none() {
            return Err(InvariantViolation::Missing(format!(
                "booking {} completed before pickup",
                self.id
            )));
        }
        self.transition(BookingStatus::Completed)?;
        self.dropoff_time = Some(now);
        Ok(())
    }

    pub fn expire(&mut self, now: u64) -> Result<(), InvariantViolation> {
        self.transition(BookingStatus::Expired)?;
        self.expired_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Idle,
    EnRoutePickup,
    EnRouteDropoff,
}

impl VehicleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::Idle => "idle",
            VehicleStatus::EnRoutePickup => "en_route_pickup",
            VehicleStatus::EnRouteDropoff => "en_route_dropoff",
        }
    }
}

/// A route a vehicle is currently driving, anchored at its departure time.
#[derive(Debug, Clone)]
pub struct ActiveRoute {
    pub route: Route,
    pub departed_at: u64,
}

impl ActiveRoute {
    pub fn arrival_time(&self) -> u64 {
        self.departed_at.saturating_add(self.route.duration_ms())
    }

    pub fn has_arrived(&self, now: u64) -> bool {
        now >= self.arrival_time()
    }

    pub fn position_at(&self, now: u64) -> LatLng {
        self.route
            .position_at(now.saturating_sub(self.departed_at))
    }

    /// Distance covered by `now`, proportional to elapsed time.
    pub fn progress(&self, now: u64) -> LegProgress {
        let total_ms = self.route.duration_ms();
        let elapsed_ms = now.saturating_sub(self.departed_at);
        let fraction = if total_ms == 0 || elapsed_ms >= total_ms {
            1.0
        } else {
            elapsed_ms as f64 / total_ms as f64
        };
        LegProgress {
            origin: self.route.origin,
            destination: self.route.destination,
            traveled_km: self.route.distance_km * fraction,
        }
    }
}

#[derive(Debug, Clone, Component)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: LatLng,
    pub status: VehicleStatus,
    pub current_booking: Option<BookingId>,
    /// `None` while idle, or while waiting for a route that failed to resolve.
    pub route: Option<ActiveRoute>,
}

impl Vehicle {
    pub fn new(id: VehicleId, position: LatLng) -> Self {
        Self {
            id,
            position,
            status: VehicleStatus::Idle,
            current_booking: None,
            route: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == VehicleStatus::Idle
    }

    fn transition(&mut self, next: VehicleStatus) -> Result<(), InvariantViolation> {
        let allowed = matches!(
            (self.status, next),
            (VehicleStatus::Idle, VehicleStatus::EnRoutePickup)
                | (VehicleStatus::EnRoutePickup, VehicleStatus::EnRouteDropoff)
                | (VehicleStatus::EnRouteDropoff, VehicleStatus::Idle)
        );
        if !allowed {
            return Err(InvariantViolation::VehicleTransition {
                vehicle: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Idle -> en route to pickup, driving `route` from `now`.
    pub fn dispatch(
        &mut self,
        booking: BookingId,
        route: Route,
        now: u64,
    ) -> Result<(), InvariantViolation> {
        route.validate()?;
        self.transition(VehicleStatus::EnRoutePickup)?;
        self.current_booking = Some(booking);
        self.route = Some(ActiveRoute {
            route,
            departed_at: now,
        });
        Ok(())
    }

    /// En route to pickup -> en route to dropoff. A missing route leaves the
    /// vehicle waiting at the pickup point until one resolves.
    pub fn begin_dropoff(&mut self, route: Option<Route>, now: u64) -> Result<(), InvariantViolation> {
        self.transition(VehicleStatus::EnRouteDropoff)?;
        self.route = None;
        if let Some(route) = route {
            self.set_route(route, now)?;
        }
        Ok(())
    }

    pub fn set_route(&mut self, route: Route, now: u64) -> Result<(), InvariantViolation> {
        route.validate()?;
        self.route = Some(ActiveRoute {
            route,
            departed_at: now,
        });
        Ok(())
    }

    /// En route to dropoff -> idle. Returns the booking that was being served.
    pub fn finish_trip(&mut self) -> Result<BookingId, InvariantViolation> {
        self.transition(VehicleStatus::Idle)?;
        self.route = None;
        self.current_booking.take().ok_or_else(|| {
            InvariantViolation::Missing(format!("vehicle {} finished a trip without a booking", self.id))
        })
    }

    /// Progress on the current leg, if the vehicle is driving one.
    pub fn leg_progress(&self, now: u64) -> Option<LegProgress> {
        self.route.as_ref().map(|active| active.progress(now))
    }

    /// Moves the vehicle along its route to `now`. Returns true when the route is complete.
    pub fn advance(&mut self, now: u64) -> bool {
        let Some(active) = &self.route else {
            return false;
        };
        if active.has_arrived(now) {
            self.position = active.route.destination();
            true
        } else {
            self.position = active.position_at(now);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_location, test_location_offset};

    fn request() -> BookingRequest {
        BookingRequest {
            id: BookingId(1),
            origin: test_location(),
            destination: test_location_offset(0.01, 0.0),
            request_time: 0,
        }
    }

    #[test]
    fn booking_follows_pending_assigned_completed() {
        let mut booking = Booking::from_request(&request());
        booking.assign(VehicleId(3), 10).expect("assign");
        booking.pick_up(20).expect("pickup");
        booking.complete(30).expect("complete");
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(booking.assigned_vehicle, Some(VehicleId(3)));
        assert_eq!((booking.assigned_at, booking.pickup_time, booking.dropoff_time), (Some(10), Some(20), Some(30)));
    }

    #[test]
    fn terminal_bookings_reject_further_transitions() {
        let mut booking = Booking::from_request(&request());
        booking.expire(5).expect("expire");
        assert!(booking.assign(VehicleId(1), 6).is_err());
        assert!(booking.expire(7).is_err());
        assert_eq!(booking.status, BookingStatus::Expired);
        assert_eq!(booking.expired_at, Some(5));
    }

    #[test]
    fn booking_cannot_skip_assignment() {
        let mut booking = Booking::from_request(&request());
        assert!(booking.pick_up(1).is_err());
        assert!(booking.complete(1).is_err());
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[test]
    fn vehicle_loops_through_trip_states() {
        let origin = test_location();
        let pickup = test_location_offset(0.001, 0.0);
        let mut vehicle = Vehicle::new(VehicleId(0), origin);

        vehicle
            .dispatch(BookingId(1), Route::straight(origin, pickup, 0.1, 10.0), 0)
            .expect("dispatch");
        assert_eq!(vehicle.status, VehicleStatus::EnRoutePickup);
        assert!(!vehicle.advance(5_000));
        assert!(vehicle.advance(10_000));
        assert_eq!(vehicle.position, pickup);

        vehicle.begin_dropoff(None, 10_000).expect("dropoff");
        assert_eq!(vehicle.status, VehicleStatus::EnRouteDropoff);
        assert!(!vehicle.advance(20_000), "no route yet, vehicle waits");

        assert_eq!(vehicle.finish_trip().expect("finish"), BookingId(1));
        assert!(vehicle.is_idle());
        assert!(vehicle.finish_trip().is_err());
    }

    #[test]
    fn leg_progress_is_proportional_to_elapsed_time() {
        let origin = test_location();
        let pickup = test_location_offset(0.001, 0.0);
        let mut vehicle = Vehicle::new(VehicleId(0), origin);
        assert!(vehicle.leg_progress(0).is_none());

        vehicle
            .dispatch(BookingId(1), Route::straight(origin, pickup, 0.2, 10.0), 1_000)
            .expect("dispatch");
        let start = vehicle.leg_progress(1_000).expect("leg");
        assert_eq!((start.origin, start.destination, start.traveled_km), (origin, pickup, 0.0));
        assert!((vehicle.leg_progress(6_000).expect("leg").traveled_km - 0.1).abs() < 1e-9);
        assert!((vehicle.leg_progress(60_000).expect("leg").traveled_km - 0.2).abs() < 1e-9);
    }

    #[test]
    fn dispatch_rejects_negative_duration() {
        let origin = test_location();
        let mut vehicle = Vehicle::new(VehicleId(0), origin);
        let route = Route::straight(origin, origin, 0.0, -1.0);
        assert!(matches!(
            vehicle.dispatch(BookingId(1), route, 0),
            Err(InvariantViolation::InvalidDuration { .. })
        ));
        assert!(vehicle.is_idle());
    }
}
