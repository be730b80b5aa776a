//! Per-tick systems, run in order by the engine schedule:
//! admission -> expiry -> matching -> commit -> movement.

pub mod admission;
pub mod commit;
pub mod expiry;
pub mod matching;
pub mod movement;

use bevy_ecs::prelude::Resource;

use crate::error::InvariantViolation;
use crate::matching::Assignment;

/// Booking policy knobs read by the systems.
#[derive(Debug, Clone, Copy, Resource)]
pub struct BookingSettings {
    /// A booking expires once `request_time + max_pending_ms < now`.
    pub max_pending_ms: u64,
}

/// Assignments proposed by the matcher this tick, consumed by the commit system.
#[derive(Debug, Default, Resource)]
pub struct TickAssignments(pub Vec<Assignment>);

/// Invariant violations raised during the current tick. The engine aborts the
/// run after any tick that leaves this non-empty.
#[derive(Debug, Default, Resource)]
pub struct Faults(pub Vec<InvariantViolation>);

impl Faults {
    pub fn raise(&mut self, violation: InvariantViolation) {
        tracing::error!(%violation, "invariant violated");
        self.0.push(violation);
    }

    pub fn record<T>(&mut self, result: Result<T, InvariantViolation>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(violation) => {
                self.raise(violation);
                None
            }
        }
    }
}
