//! Scenario setup: turns a validated [`Config`] into [`EngineParts`].
//!
//! Loads the geofence, the demand file and the fleet stations, places the fleet,
//! and builds the routers, the matcher and the optional map matcher. Two options
//! naming the same router share one instance (and one route cache).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::clock::{ONE_MIN_MS, ONE_SEC_MS};
use crate::config::Config;
use crate::demand::{load_demand, DemandOptions, ReplayDemand};
use crate::engine::EngineParts;
use crate::error::{ConfigError, SimError};
use crate::fleet::{load_stations, place_vehicles};
use crate::geofence::Geofence;
use crate::map_match::MapMatcher;
use crate::matching::build_matcher;
use crate::routing::{build_router, Router};

/// Routers built so far, by configured name.
#[derive(Default)]
struct Routers(HashMap<String, Arc<dyn Router>>);

impl Routers {
    fn get(&mut self, config: &Config, option: &'static str, name: &str) -> Result<Arc<dyn Router>, ConfigError> {
        if let Some(router) = self.0.get(name) {
            return Ok(router.clone());
        }
        let router = build_router(&config.router_kind(option, name)?)?;
        self.0.insert(name.to_string(), router.clone());
        Ok(router)
    }
}

pub fn build_engine_parts(config: &Config) -> Result<EngineParts, SimError> {
    let starting_time = config.starting_time()?;
    let resolution = config.resolution()?;
    let policy = config.simulation.out_of_bounds;

    let geofence = Geofence::load(&config.geofence_path())?;
    let options = DemandOptions {
        starting_time,
        duration_ms: config.duration_ms(),
        bookings_per_hour: config.bookings.bookings_per_hour,
        seed: config.simulation.demand_seed,
        out_of_bounds: policy,
    };
    let (requests, demand_stats) = load_demand(&config.demand_path(), &geofence, &options)?;

    let stations = load_stations(&config.stations_path(), &geofence, policy)?;
    let vehicles = place_vehicles(&stations, config.fleet.vehicles, config.simulation.fleet_seed)?;

    let mut routers = Routers::default();
    let fleet_router = routers.get(config, "fleet.router", &config.fleet.router)?;
    let (solver_kind, solver) = config.solver()?;
    let solver_router = routers.get(config, "router", &solver.router)?;
    // search_radius is minutes of estimated pickup time.
    let search_radius_secs = solver.search_radius * (ONE_MIN_MS / ONE_SEC_MS) as f64;
    let matcher = build_matcher(solver_kind, solver_router, search_radius_secs);

    info!(
        solver = matcher.name(),
        fleet_router = %config.fleet.router,
        vehicles = vehicles.len(),
        stations = stations.len(),
        bookings = requests.len(),
        "scenario ready"
    );

    Ok(EngineParts {
        starting_time,
        duration_ms: config.duration_ms(),
        clock_step_ms: config.clock_step_ms(),
        max_pending_ms: config.max_pending_ms(),
        resolution,
        demand: Box::new(ReplayDemand::new(requests)),
        vehicles,
        matcher,
        fleet_router,
        map_matcher: build_map_matcher(config)?,
        demand_stats: Some(demand_stats),
    })
}

fn build_map_matcher(config: &Config) -> Result<Option<Box<dyn MapMatcher>>, ConfigError> {
    if !config.simulation.map_match {
        return Ok(None);
    }
    let osrm = config.osrm.as_ref().ok_or_else(|| {
        ConfigError::invalid("simulation.map_match", "map matching needs an `[osrm]` block")
    })?;

    #[cfg(feature = "osrm")]
    {
        let matcher = crate::map_match::OsrmMapMatcher::from_config(osrm)?;
        Ok(Some(Box::new(matcher)))
    }
    #[cfg(not(feature = "osrm"))]
    {
        let _ = osrm;
        Err(ConfigError::invalid(
            "simulation.map_match",
            "this build does not include the `osrm` feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const ROUTERS: &str = r#"
geofence = "g.geojson"
demand_file = "d.parquet"

[fleet]
stations = "s.geojson"
vehicles = 1
router = "linear"

[bookings]
max_pending_time = 10

[simulation]
duration = 60
starting_time = "2019-02-01 08:00:00"
resolution = 9
demand_seed = 1
fleet_seed = 2
clock_step = 10
output = "trace.csv"

[greedy_matcher]
search_radius = 5
router = "linear"

[linear]
speed = 30
"#;

    #[test]
    fn same_router_name_shares_one_instance() {
        let config = Config::parse(ROUTERS, Path::new("routers.toml"), Default::default()).expect("parse");
        let mut routers = Routers::default();
        let fleet = routers.get(&config, "fleet.router", "linear").expect("fleet router");
        let solver = routers.get(&config, "router", "linear").expect("solver router");
        assert!(Arc::ptr_eq(&fleet, &solver));
        assert!(routers.get(&config, "router", "teleport").is_err());
    }

    #[test]
    fn map_match_disabled_builds_nothing() {
        let config = Config::parse(ROUTERS, Path::new("routers.toml"), Default::default()).expect("parse");
        assert!(build_map_matcher(&config).expect("no matcher").is_none());
    }
}
