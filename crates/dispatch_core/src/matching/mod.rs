pub mod algorithm;
pub mod batch;
pub mod greedy;
pub mod types;

use std::sync::Arc;

use bevy_ecs::prelude::Resource;

pub use algorithm::Matcher;
pub use batch::BatchMatcher;
pub use greedy::GreedyMatcher;
pub use types::{Assignment, IdleVehicle, MatchFailure, MatchOutcome, PendingBooking};

use crate::routing::Router;

/// Which solver to run, selected by `simulation.solver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Greedy,
    Batch,
}

/// Build a matcher. `search_radius_secs` bounds the estimated pickup duration.
pub fn build_matcher(
    kind: SolverKind,
    router: Arc<dyn Router>,
    search_radius_secs: f64,
) -> Box<dyn Matcher> {
    match kind {
        SolverKind::Greedy => Box::new(GreedyMatcher::new(router, search_radius_secs)),
        SolverKind::Batch => Box::new(BatchMatcher::new(router, search_radius_secs)),
    }
}

/// Resource wrapper for the matcher trait object.
#[derive(Resource)]
pub struct MatcherResource(pub Box<dyn Matcher>);

impl MatcherResource {
    pub fn new(matcher: Box<dyn Matcher>) -> Self {
        Self(matcher)
    }
}

impl std::ops::Deref for MatcherResource {
    type Target = dyn Matcher;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
