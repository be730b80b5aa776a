//! Batch matching via Kuhn-Munkres (Hungarian) assignment.
//!
//! Builds the pickup-duration matrix between every pending booking and every idle
//! vehicle and solves for the minimum total pickup duration. Pairs above the
//! search radius are infeasible and never returned.

use std::sync::Arc;

use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::routing::{Route, Router};

use super::algorithm::Matcher;
use super::types::{Assignment, IdleVehicle, MatchFailure, MatchOutcome, PendingBooking};

/// Weight for pairs outside the search radius (never selected).
/// Must be worse than any feasible weight but not so extreme that negating and
/// summing overflows i64.
const INFEASIBLE: i64 = -1_000_000_000_000_i64;

/// Feasible weights are capped here so they always beat `INFEASIBLE`.
const MAX_WEIGHT_MS: u64 = 100_000_000_000;

/// Simple matrix type implementing pathfinding's Weights for i64.
struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |r| r.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|r| r.iter().map(|&x| x.saturating_neg()).collect())
                .collect(),
        )
    }
}

/// Minimum-total-pickup-duration assignment across the whole tick.
pub struct BatchMatcher {
    router: Arc<dyn Router>,
    search_radius_secs: f64,
}

impl BatchMatcher {
    pub fn new(router: Arc<dyn Router>, search_radius_secs: f64) -> Self {
        Self {
            router,
            search_radius_secs,
        }
    }

    /// Pickup routes from every vehicle to `booking`, or the first backend failure.
    fn estimate_row(
        &self,
        booking: &PendingBooking,
        vehicles: &[IdleVehicle],
    ) -> Result<Vec<Option<Route>>, MatchFailure> {
        let mut row = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            match self.router.estimate(vehicle.position, booking.origin) {
                Ok(route) if route.duration_secs <= self.search_radius_secs => row.push(Some(route)),
                Ok(_) | Err(RoutingError::NoRoute) => row.push(None),
                Err(error) => {
                    return Err(MatchFailure {
                        booking: booking.id,
                        vehicle: vehicle.id,
                        error,
                    })
                }
            }
        }
        Ok(row)
    }
}

/// Negated duration in ms, so a maximum-weight assignment minimises total pickup time.
fn weight(route: &Route) -> i64 {
    -(route.duration_ms().min(MAX_WEIGHT_MS) as i64)
}

impl Matcher for BatchMatcher {
    fn name(&self) -> &'static str {
        "batch_matcher"
    }

    fn match_bookings(&self, pending: &[PendingBooking], idle: &[IdleVehicle]) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        if pending.is_empty() || idle.is_empty() {
            return outcome;
        }

        let mut bookings: Vec<PendingBooking> = pending.to_vec();
        bookings.sort_by_key(|b| (b.request_time, b.id));
        let mut vehicles: Vec<IdleVehicle> = idle.to_vec();
        vehicles.sort_by_key(|v| v.id);

        // Bookings whose estimates hit a backend failure sit this tick out.
        let mut rows: Vec<(PendingBooking, Vec<Option<Route>>)> = Vec::with_capacity(bookings.len());
        for booking in bookings {
            match self.estimate_row(&booking, &vehicles) {
                Ok(routes) => rows.push((booking, routes)),
                Err(failure) => {
                    warn!(booking = %failure.booking, error = %failure.error, "withholding booking from batch");
                    outcome.failures.push(failure);
                }
            }
        }

        let has_feasible = rows.iter().any(|(_, routes)| routes.iter().any(Option::is_some));
        if !has_feasible {
            return outcome;
        }

        // Kuhn-Munkres requires rows <= columns, so the smaller side becomes rows.
        let bookings_are_rows = rows.len() <= vehicles.len();
        let cell = |b: usize, v: usize| rows[b].1[v].as_ref().map_or(INFEASIBLE, weight);
        let matrix: Vec<Vec<i64>> = if bookings_are_rows {
            (0..rows.len())
                .map(|b| (0..vehicles.len()).map(|v| cell(b, v)).collect())
                .collect()
        } else {
            (0..vehicles.len())
                .map(|v| (0..rows.len()).map(|b| cell(b, v)).collect())
                .collect()
        };

        let (_total, solution) = kuhn_munkres(&I64Weights(matrix));
        let mut pairs: Vec<(usize, usize)> = solution
            .into_iter()
            .enumerate()
            .map(|(row, col)| if bookings_are_rows { (row, col) } else { (col, row) })
            .collect();
        // Commit order follows request order.
        pairs.sort_unstable();

        for (b, v) in pairs {
            let Some(route) = rows[b].1[v].take() else {
                continue;
            };
            outcome.assignments.push(Assignment {
                booking: rows[b].0.id,
                vehicle: vehicles[v].id,
                pickup: route,
            });
        }
        debug!(assigned = outcome.assignments.len(), "batch assignment solved");
        outcome
    }
}
