#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDateTime;
use dispatch_core::clock::{ONE_MIN_MS, ONE_SEC_MS};
use dispatch_core::demand::{BookingRequest, ReplayDemand};
use dispatch_core::ecs::{BookingId, Vehicle, VehicleId};
use dispatch_core::engine::{Engine, EngineParts};
use dispatch_core::matching::{build_matcher, SolverKind};
use dispatch_core::routing::{LinearRouter, Router};
use h3o::{LatLng, Resolution};

pub const SPEED_KMH: f64 = 36.0;

pub fn epoch() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2019-02-01 08:00:00", "%Y-%m-%d %H:%M:%S").expect("epoch")
}

/// Pickup estimate the builder's default router gives for a pair of points.
pub fn linear_duration_secs(origin: LatLng, destination: LatLng) -> f64 {
    LinearRouter::new(SPEED_KMH)
        .estimate(origin, destination)
        .expect("linear estimate")
        .duration_secs
}

/// Helper that assembles an in-memory engine with a linear router.
#[derive(Clone)]
pub struct TestEngineBuilder {
    step_ms: u64,
    duration_ms: u64,
    max_pending_ms: u64,
    search_radius_secs: f64,
    solver: SolverKind,
    requests: Vec<BookingRequest>,
    vehicles: Vec<Vehicle>,
    router: Option<Arc<dyn Router>>,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self {
            step_ms: 10 * ONE_SEC_MS,
            duration_ms: 30 * ONE_MIN_MS,
            max_pending_ms: 5 * ONE_MIN_MS,
            search_radius_secs: 600.0,
            solver: SolverKind::Greedy,
            requests: Vec::new(),
            vehicles: Vec::new(),
            router: None,
        }
    }
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_secs(mut self, secs: u64) -> Self {
        self.step_ms = secs * ONE_SEC_MS;
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn with_max_pending_ms(mut self, ms: u64) -> Self {
        self.max_pending_ms = ms;
        self
    }

    pub fn with_search_radius_secs(mut self, secs: f64) -> Self {
        self.search_radius_secs = secs;
        self
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Router shared by the fleet and the matcher. Defaults to linear at [`SPEED_KMH`].
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_vehicle(mut self, id: u64, position: LatLng) -> Self {
        self.vehicles.push(Vehicle::new(VehicleId(id), position));
        self
    }

    pub fn with_request(mut self, id: u64, origin: LatLng, destination: LatLng, at_ms: u64) -> Self {
        self.requests.push(BookingRequest {
            id: BookingId(id),
            origin,
            destination,
            request_time: at_ms,
        });
        self
    }

    pub fn build(self) -> Engine {
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(LinearRouter::new(SPEED_KMH)));
        Engine::new(EngineParts {
            starting_time: epoch(),
            duration_ms: self.duration_ms,
            clock_step_ms: self.step_ms,
            max_pending_ms: self.max_pending_ms,
            resolution: Resolution::Nine,
            demand: Box::new(ReplayDemand::new(self.requests)),
            vehicles: self.vehicles,
            matcher: build_matcher(self.solver, router.clone(), self.search_radius_secs),
            fleet_router: router,
            map_matcher: None,
            demand_stats: None,
        })
    }
}
