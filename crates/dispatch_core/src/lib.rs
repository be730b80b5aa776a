//! Discrete-time ride-hailing dispatch simulator.
//!
//! Bookings replayed from a demand file are matched to a fleet of vehicles inside
//! a geofence, tick by tick, and every state change is written to a trace.

pub mod clock;
pub mod config;
pub mod demand;
pub mod ecs;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod geofence;
pub mod map_match;
pub mod matching;
pub mod queue;
pub mod routing;
pub mod scenario;
pub mod systems;
pub mod telemetry;
pub mod trace_export;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::Config;
pub use engine::{Engine, EngineParts, EngineState};
pub use error::SimError;
pub use telemetry::{SimulationReport, SimulationSummary};
