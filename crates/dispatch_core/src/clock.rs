use bevy_ecs::prelude::Resource;
use chrono::NaiveDateTime;

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

/// Fixed-step simulation clock. Times are milliseconds since `starting_time`.
///
/// Ticks cover the half-open window `[0, end)`: the first tick runs at 0 and
/// the clock settles exactly on `end` once the last step has been taken.
#[derive(Debug, Clone, Resource)]
pub struct SimulationClock {
    epoch: NaiveDateTime,
    now: u64,
    step_ms: u64,
    end_ms: u64,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(epoch: NaiveDateTime, step_ms: u64, duration_ms: u64) -> Self {
        debug_assert!(step_ms > 0, "clock step must be positive");
        Self {
            epoch,
            now: 0,
            step_ms: step_ms.max(1),
            end_ms: duration_ms,
            ticks: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn step_ms(&self) -> u64 {
        self.step_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    /// Number of ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_finished(&self) -> bool {
        self.now >= self.end_ms
    }

    /// Wall-clock time for a simulation timestamp.
    pub fn datetime_at(&self, at_ms: u64) -> NaiveDateTime {
        self.epoch + chrono::Duration::milliseconds(at_ms as i64)
    }

    /// Marks the current tick as done and moves to the next one, never past `end`.
    /// Returns the new time, or `None` once the clock has reached the end.
    pub fn advance(&mut self) -> Option<u64> {
        if self.is_finished() {
            return None;
        }
        self.ticks += 1;
        self.now = self.now.saturating_add(self.step_ms).min(self.end_ms);
        if self.is_finished() {
            None
        } else {
            Some(self.now)
        }
    }
}
