//! Pluggable routers: origin/destination pairs to travel time and path.
//!
//! Two implementations, selectable via [`RouterKind`]:
//!
//! - **`LinearRouter`**: great-circle distance at a constant speed, straight-line path.
//!   Deterministic, no I/O.
//! - **`OsrmRouter`** (feature `osrm`): calls an OSRM HTTP endpoint with a bounded timeout.
//!
//! Routers are shared as `Arc<dyn Router>`: the fleet router moves vehicles and
//! each solver holds the router it estimates pickups with. Two options naming the
//! same router share one instance.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use h3o::LatLng;
use lru::LruCache;

use crate::error::{ConfigError, InvariantViolation, RoutingError};

#[cfg(feature = "osrm")]
pub mod osrm;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Result of a route query.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub origin: LatLng,
    pub destination: LatLng,
    /// Road geometry from origin to destination. Empty means a straight line.
    pub path: Vec<LatLng>,
    /// Network (or straight-line) distance in kilometres.
    pub distance_km: f64,
    /// Travel time in seconds.
    pub duration_secs: f64,
}

impl Route {
    /// Straight-line route; used by the linear router and as a fallback geometry.
    pub fn straight(origin: LatLng, destination: LatLng, distance_km: f64, duration_secs: f64) -> Self {
        Self {
            origin,
            destination,
            path: Vec::new(),
            distance_km,
            duration_secs,
        }
    }

    pub fn destination(&self) -> LatLng {
        self.destination
    }

    /// Points the vehicle drives through, endpoints included.
    pub fn waypoints(&self) -> Vec<LatLng> {
        if self.path.len() >= 2 {
            self.path.clone()
        } else {
            vec![self.origin, self.destination]
        }
    }

    /// Travel time rounded up to whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            (self.duration_secs * 1000.0).ceil() as u64
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(InvariantViolation::InvalidDuration {
                duration_secs: self.duration_secs,
            });
        }
        Ok(())
    }

    /// Point reached after `elapsed_ms`, assuming constant speed along the path.
    pub fn position_at(&self, elapsed_ms: u64) -> LatLng {
        let total_ms = self.duration_ms();
        if elapsed_ms >= total_ms {
            return self.destination;
        }
        let fraction = elapsed_ms as f64 / total_ms as f64;

        let points = self.waypoints();
        let legs: Vec<f64> = points
            .windows(2)
            .map(|pair| pair[0].distance_km(pair[1]))
            .collect();
        let length: f64 = legs.iter().sum();
        if length <= 0.0 {
            return self.destination;
        }

        let mut remaining = fraction * length;
        for (pair, leg) in points.windows(2).zip(legs) {
            if remaining <= leg && leg > 0.0 {
                return interpolate(pair[0], pair[1], remaining / leg);
            }
            remaining -= leg;
        }
        self.destination
    }
}

fn interpolate(from: LatLng, to: LatLng, t: f64) -> LatLng {
    let lat = from.lat() + (to.lat() - from.lat()) * t;
    let lng = from.lng() + (to.lng() - from.lng()) * t;
    LatLng::new(lat, lng).unwrap_or(to)
}

/// Trait for routing backends. `Send + Sync` so routers can live in ECS resources.
pub trait Router: Send + Sync {
    /// Estimate travel between two points. `Err(NoRoute)` when the backend says no
    /// route exists; `Err(Unavailable)` when the backend itself failed.
    fn estimate(&self, origin: LatLng, destination: LatLng) -> Result<Route, RoutingError>;
}

/// Router that moves vehicles along pickup and dropoff legs.
#[derive(Resource, Clone)]
pub struct FleetRouter(pub Arc<dyn Router>);

/// Which routing backend to build. Produced from the `[linear]` / `[osrm]` config blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterKind {
    Linear {
        speed_kmh: f64,
    },
    Osrm {
        server: String,
        timeout_secs: u64,
        cache_size: usize,
    },
}

// ---------------------------------------------------------------------------
// Linear provider (always available)
// ---------------------------------------------------------------------------

/// Great-circle distance at a constant speed.
#[derive(Debug, Clone)]
pub struct LinearRouter {
    speed_kmh: f64,
}

impl LinearRouter {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }
}

impl Router for LinearRouter {
    fn estimate(&self, origin: LatLng, destination: LatLng) -> Result<Route, RoutingError> {
        let distance_km = origin.distance_km(destination);
        let duration_secs = if distance_km > 0.0 {
            distance_km / self.speed_kmh * 3600.0
        } else {
            0.0
        };
        Ok(Route::straight(origin, destination, distance_km, duration_secs))
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// Coordinates rounded to ~10 cm so nearly-identical queries share an entry.
type CacheKey = (i64, i64, i64, i64);

fn cache_key(origin: LatLng, destination: LatLng) -> CacheKey {
    let q = |v: f64| (v * 1e6).round() as i64;
    (q(origin.lat()), q(origin.lng()), q(destination.lat()), q(destination.lng()))
}

/// LRU-cached wrapper around any [`Router`]. Only successful routes are cached,
/// so a failing backend is asked again on the next tick.
pub struct CachedRouter {
    inner: Box<dyn Router>,
    cache: Mutex<LruCache<CacheKey, Route>>,
}

impl CachedRouter {
    pub fn new(inner: Box<dyn Router>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Router for CachedRouter {
    fn estimate(&self, origin: LatLng, destination: LatLng) -> Result<Route, RoutingError> {
        let key = cache_key(origin, destination);

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let route = self.inner.estimate(origin, destination)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, route.clone());
        }
        Ok(route)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Construct a shared router from its descriptor. OSRM is always wrapped in a
/// [`CachedRouter`].
pub fn build_router(kind: &RouterKind) -> Result<Arc<dyn Router>, ConfigError> {
    match kind {
        RouterKind::Linear { speed_kmh } => Ok(Arc::new(LinearRouter::new(*speed_kmh))),

        #[cfg(feature = "osrm")]
        RouterKind::Osrm {
            server,
            timeout_secs,
            cache_size,
        } => {
            let inner = osrm::OsrmRouter::new(server, std::time::Duration::from_secs(*timeout_secs))
                .map_err(|err| ConfigError::invalid("osrm.server", err.to_string()))?;
            Ok(Arc::new(CachedRouter::new(Box::new(inner), *cache_size)))
        }

        #[cfg(not(feature = "osrm"))]
        RouterKind::Osrm { .. } => Err(ConfigError::invalid(
            "osrm",
            "this build does not include the `osrm` feature",
        )),
    }
}
