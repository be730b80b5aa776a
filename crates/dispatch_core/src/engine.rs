//! Simulation engine: owns the world, the clock and the tick schedule.
//!
//! Each [`Engine::step`] runs one tick of the schedule at the current clock time and
//! then advances the clock. Once the clock reaches `starting_time + duration` the
//! engine closes the run: bookings still pending or assigned are traced as
//! unresolved, lifecycles are collected (and map matched when configured) and the
//! [`SimulationReport`] is built. Nothing is global; engines in one process are
//! independent.

use std::sync::Arc;

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, ExecutorKind, IntoSystemConfigs};
use chrono::NaiveDateTime;
use h3o::{LatLng, Resolution};
use tracing::{debug, info};

use crate::clock::SimulationClock;
use crate::config::Config;
use crate::demand::{DemandFeed, DemandLoadStats, DemandSource};
use crate::ecs::{Booking, BookingStatus, Vehicle, VehicleId};
use crate::error::{InvariantViolation, SimError};
use crate::fleet::VehicleIndex;
use crate::map_match::{map_match_lifecycles, MapMatcher};
use crate::matching::{Matcher, MatcherResource};
use crate::queue::{BookingIndex, BookingQueue};
use crate::routing::{FleetRouter, Router};
use crate::systems::{
    admission::admit_demand_system, commit::commit_assignments_system,
    expiry::expire_bookings_system, matching::matching_system, movement::movement_system,
    BookingSettings, Faults, TickAssignments,
};
use crate::telemetry::{
    BookingLifecycle, SimulationReport, SimulationSummary, Trace, TraceEvent, TraceEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    Completed,
}

/// Everything an engine is built from. [`crate::scenario::build_engine_parts`]
/// fills this from a config; tests build it in memory.
pub struct EngineParts {
    pub starting_time: NaiveDateTime,
    pub duration_ms: u64,
    pub clock_step_ms: u64,
    pub max_pending_ms: u64,
    pub resolution: Resolution,
    pub demand: Box<dyn DemandSource>,
    pub vehicles: Vec<Vehicle>,
    pub matcher: Box<dyn Matcher>,
    /// Router vehicles drive with.
    pub fleet_router: Arc<dyn Router>,
    pub map_matcher: Option<Box<dyn MapMatcher>>,
    pub demand_stats: Option<DemandLoadStats>,
}

/// The fixed per-tick pipeline. Bookings spawned by admission are applied before
/// expiry so they are eligible for matching in the tick they arrive.
pub fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            admit_demand_system,
            apply_deferred,
            expire_bookings_system,
            matching_system,
            commit_assignments_system,
            movement_system,
        )
            .chain(),
    );
    schedule
}

pub struct Engine {
    world: World,
    schedule: Schedule,
    state: EngineState,
    resolution: Resolution,
    map_matcher: Option<Box<dyn MapMatcher>>,
    demand_stats: Option<DemandLoadStats>,
    report: Option<SimulationReport>,
}

impl Engine {
    /// Load every input a validated config names and build the engine.
    pub fn from_config(config: &Config) -> Result<Self, SimError> {
        let parts = crate::scenario::build_engine_parts(config)?;
        Ok(Self::new(parts))
    }

    pub fn new(parts: EngineParts) -> Self {
        let mut world = World::new();
        world.insert_resource(SimulationClock::new(
            parts.starting_time,
            parts.clock_step_ms,
            parts.duration_ms,
        ));
        world.insert_resource(DemandFeed(parts.demand));
        world.insert_resource(BookingQueue::default());
        world.insert_resource(BookingIndex::default());
        world.insert_resource(BookingSettings {
            max_pending_ms: parts.max_pending_ms,
        });
        world.insert_resource(MatcherResource::new(parts.matcher));
        world.insert_resource(FleetRouter(parts.fleet_router));
        world.insert_resource(TickAssignments::default());
        world.insert_resource(Faults::default());
        world.insert_resource(Trace::default());

        let mut vehicles = parts.vehicles;
        vehicles.sort_by_key(|vehicle| vehicle.id);
        let mut index = VehicleIndex::default();
        for vehicle in vehicles {
            let id = vehicle.id;
            let entity = world.spawn(vehicle).id();
            index.0.insert(id, entity);
        }
        world.insert_resource(index);

        Self {
            world,
            schedule: tick_schedule(),
            state: EngineState::NotStarted,
            resolution: parts.resolution,
            map_matcher: parts.map_matcher,
            demand_stats: parts.demand_stats,
            report: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current simulation time in ms since the start.
    pub fn now(&self) -> u64 {
        self.world.resource::<SimulationClock>().now()
    }

    /// Read access to the live world, for inspection between steps.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The report of a completed run.
    pub fn report(&self) -> Option<&SimulationReport> {
        self.report.as_ref()
    }

    /// Runs one tick. Returns `Ok(false)` once the run is complete.
    ///
    /// An invariant violation during the tick completes the run without a report.
    pub fn step(&mut self) -> Result<bool, SimError> {
        match self.state {
            EngineState::Completed => return Ok(false),
            EngineState::NotStarted => {
                let clock = self.world.resource::<SimulationClock>();
                info!(
                    starting_time = %clock.epoch(),
                    duration_ms = clock.end_ms(),
                    step_ms = clock.step_ms(),
                    vehicles = self.world.resource::<VehicleIndex>().0.len(),
                    bookings = self.world.resource::<DemandFeed>().0.remaining(),
                    "simulation started"
                );
                self.state = EngineState::Running;
            }
            EngineState::Running => {}
        }

        if !self.world.resource::<SimulationClock>().is_finished() {
            let clock = self.world.resource::<SimulationClock>();
            debug!(tick = clock.ticks(), now_ms = clock.now(), "tick");
            self.schedule.run(&mut self.world);

            let faults = std::mem::take(&mut self.world.resource_mut::<Faults>().0);
            if let Some(first) = faults.into_iter().next() {
                self.state = EngineState::Completed;
                return Err(SimError::Invariant(first));
            }
            if self.world.resource_mut::<SimulationClock>().advance().is_some() {
                return Ok(true);
            }
        }

        self.finish();
        Ok(true)
    }

    /// Steps until the run completes and returns its report.
    pub fn run(&mut self) -> Result<SimulationReport, SimError> {
        while self.step()? {}
        self.report.clone().ok_or_else(|| {
            SimError::Invariant(InvariantViolation::Missing(
                "run completed without a report".to_string(),
            ))
        })
    }

    fn finish(&mut self) {
        let (end, epoch, ticks) = {
            let clock = self.world.resource::<SimulationClock>();
            (clock.end_ms(), clock.epoch(), clock.ticks())
        };

        let mut bookings: Vec<Booking> = self
            .world
            .query::<&Booking>()
            .iter(&self.world)
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| booking.id);

        let positions: Vec<(VehicleId, LatLng)> = self
            .world
            .query::<&Vehicle>()
            .iter(&self.world)
            .map(|vehicle| (vehicle.id, vehicle.position))
            .collect();

        let mut trace = std::mem::take(&mut self.world.resource_mut::<Trace>().events);
        for booking in bookings.iter().filter(|b| !b.status.is_terminal()) {
            let mut event = TraceEvent::new(end, TraceEventKind::BookingUnresolved)
                .booking(booking.id, booking.status)
                .at(booking.origin);
            if booking.status == BookingStatus::Assigned {
                if let Some((id, position)) = booking
                    .assigned_vehicle
                    .and_then(|id| positions.iter().find(|(v, _)| *v == id))
                {
                    event.vehicle = Some(*id);
                    event.position = Some(*position);
                }
            }
            trace.push(event);
        }

        let mut lifecycles: Vec<BookingLifecycle> =
            bookings.iter().map(BookingLifecycle::from_booking).collect();
        let map_match_failures = match &self.map_matcher {
            Some(matcher) => map_match_lifecycles(&mut lifecycles, matcher.as_ref()),
            None => 0,
        };

        let trace = Trace { events: trace };
        let summary = SimulationSummary {
            map_match_failures,
            ..SimulationSummary::from_run(&trace, &lifecycles, ticks)
        };
        info!(
            ticks = summary.ticks,
            requested = summary.requested,
            assigned = summary.assigned,
            completed = summary.completed,
            expired = summary.expired,
            unresolved_pending = summary.unresolved_pending,
            unresolved_assigned = summary.unresolved_assigned,
            routing_failures = summary.routing_failures,
            map_match_failures = summary.map_match_failures,
            "simulation finished"
        );

        self.report = Some(SimulationReport {
            epoch,
            resolution: self.resolution,
            summary,
            trace: trace.events,
            bookings: lifecycles,
            demand: self.demand_stats,
        });
        self.state = EngineState::Completed;
    }
}
