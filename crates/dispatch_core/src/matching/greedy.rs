use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::routing::{Route, Router};

use super::algorithm::Matcher;
use super::types::{Assignment, IdleVehicle, MatchFailure, MatchOutcome, PendingBooking};

/// Greedy nearest-by-time matching.
///
/// Bookings are served in `(request_time, id)` order. Each takes the idle vehicle
/// with the smallest estimated pickup duration (ties go to the lower vehicle id)
/// if that duration is within `search_radius_secs`; the vehicle then leaves the
/// pool for the rest of the tick. No backtracking.
pub struct GreedyMatcher {
    router: Arc<dyn Router>,
    search_radius_secs: f64,
}

impl GreedyMatcher {
    pub fn new(router: Arc<dyn Router>, search_radius_secs: f64) -> Self {
        Self {
            router,
            search_radius_secs,
        }
    }
}

impl Matcher for GreedyMatcher {
    fn name(&self) -> &'static str {
        "greedy_matcher"
    }

    fn match_bookings(&self, pending: &[PendingBooking], idle: &[IdleVehicle]) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        if pending.is_empty() || idle.is_empty() {
            return outcome;
        }

        let mut bookings: Vec<&PendingBooking> = pending.iter().collect();
        bookings.sort_by_key(|b| (b.request_time, b.id));
        let mut pool: Vec<IdleVehicle> = idle.to_vec();
        pool.sort_by_key(|v| v.id);
        let mut taken = vec![false; pool.len()];

        'bookings: for booking in bookings {
            let mut best: Option<(usize, Route)> = None;

            for (slot, vehicle) in pool.iter().enumerate() {
                if taken[slot] {
                    continue;
                }
                match self.router.estimate(vehicle.position, booking.origin) {
                    Ok(route) => {
                        let better = best
                            .as_ref()
                            .map_or(true, |(_, current)| route.duration_secs < current.duration_secs);
                        if better {
                            best = Some((slot, route));
                        }
                    }
                    Err(RoutingError::NoRoute) => {
                        debug!(booking = %booking.id, vehicle = %vehicle.id, "no pickup route");
                    }
                    Err(error) => {
                        // Router is down: retry this booking next tick.
                        warn!(booking = %booking.id, vehicle = %vehicle.id, %error, "pickup estimate failed");
                        outcome.failures.push(MatchFailure {
                            booking: booking.id,
                            vehicle: vehicle.id,
                            error,
                        });
                        continue 'bookings;
                    }
                }
            }

            let Some((slot, route)) = best else {
                continue;
            };
            if route.duration_secs > self.search_radius_secs {
                continue;
            }
            taken[slot] = true;
            outcome.assignments.push(Assignment {
                booking: booking.id,
                vehicle: pool[slot].id,
                pickup: route,
            });
        }

        outcome
    }
}
