//! Post-run map matching: snaps recorded pickup/dropoff points onto the road network.
//!
//! Runs once after the last tick over the booking lifecycles. The event trace is
//! never rewritten.

use h3o::LatLng;
use tracing::{info, warn};

use crate::error::RoutingError;
use crate::telemetry::BookingLifecycle;

/// Snaps a coordinate onto the nearest road.
pub trait MapMatcher: Send + Sync {
    fn snap(&self, point: LatLng) -> Result<LatLng, RoutingError>;
}

#[cfg(feature = "osrm")]
pub use osrm_nearest::OsrmMapMatcher;

#[cfg(feature = "osrm")]
mod osrm_nearest {
    use std::time::Duration;

    use h3o::LatLng;

    use super::MapMatcher;
    use crate::config::OsrmConfig;
    use crate::error::{ConfigError, RoutingError};
    use crate::routing::osrm::OsrmRouter;

    /// Map matcher backed by the OSRM `/nearest` service.
    pub struct OsrmMapMatcher {
        client: OsrmRouter,
    }

    impl OsrmMapMatcher {
        pub fn from_config(config: &OsrmConfig) -> Result<Self, ConfigError> {
            let client = OsrmRouter::new(&config.server, Duration::from_secs(config.timeout))
                .map_err(|err| ConfigError::invalid("osrm.server", err.to_string()))?;
            Ok(Self { client })
        }
    }

    impl MapMatcher for OsrmMapMatcher {
        fn snap(&self, point: LatLng) -> Result<LatLng, RoutingError> {
            self.client.snap_nearest(point)
        }
    }
}

/// Snaps every lifecycle's pickup and dropoff. A failed snap keeps the raw point.
/// Returns the number of points that could not be snapped.
pub fn map_match_lifecycles(lifecycles: &mut [BookingLifecycle], matcher: &dyn MapMatcher) -> usize {
    let mut failed = 0;
    for lifecycle in lifecycles.iter_mut() {
        let mut snapped_both = true;
        for (label, point) in [("pickup", &mut lifecycle.pickup), ("dropoff", &mut lifecycle.dropoff)] {
            match matcher.snap(*point) {
                Ok(snapped) => *point = snapped,
                Err(error) => {
                    warn!(booking = %lifecycle.id, point = label, %error, "map matching failed, keeping raw point");
                    snapped_both = false;
                    failed += 1;
                }
            }
        }
        lifecycle.map_matched = snapped_both;
    }
    info!(bookings = lifecycles.len(), failed, "map matching finished");
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::BookingRequest;
    use crate::ecs::{Booking, BookingId};
    use crate::test_helpers::{test_location, test_location_offset};

    /// Shifts points north; fails for anything north of the test location.
    struct NorthSnapper;

    impl MapMatcher for NorthSnapper {
        fn snap(&self, point: LatLng) -> Result<LatLng, RoutingError> {
            if point.lat() > test_location().lat() + 1e-9 {
                return Err(RoutingError::Unavailable("timeout".into()));
            }
            LatLng::new(point.lat() + 0.0001, point.lng())
                .map_err(|err| RoutingError::Unavailable(err.to_string()))
        }
    }

    fn lifecycle(id: u64, destination: LatLng) -> BookingLifecycle {
        BookingLifecycle::from_booking(&Booking::from_request(&BookingRequest {
            id: BookingId(id),
            origin: test_location(),
            destination,
            request_time: 0,
        }))
    }

    #[test]
    fn snaps_points_and_keeps_raw_on_failure() {
        let south = test_location_offset(-0.01, 0.0);
        let north = test_location_offset(0.01, 0.0);
        let mut lifecycles = vec![lifecycle(0, south), lifecycle(1, north)];

        let failed = map_match_lifecycles(&mut lifecycles, &NorthSnapper);

        assert_eq!(failed, 1);
        assert!(lifecycles[0].map_matched);
        assert!((lifecycles[0].dropoff.lat() - (south.lat() + 0.0001)).abs() < 1e-9);
        assert!(!lifecycles[1].map_matched);
        assert_eq!(lifecycles[1].dropoff, north);
        assert_ne!(lifecycles[1].pickup, test_location(), "pickup still snapped");
    }
}
