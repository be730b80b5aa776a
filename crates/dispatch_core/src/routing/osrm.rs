//! OSRM HTTP adapter: `/route` for travel estimates and `/nearest` for snapping.
//!
//! Every request is bounded by the client timeout. Transport failures, timeouts
//! and unexpected payloads become [`RoutingError::Unavailable`]; an OSRM
//! `NoRoute` answer becomes [`RoutingError::NoRoute`].

use std::time::Duration;

use h3o::LatLng;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{Route, Router};
use crate::error::RoutingError;

/// Routes via an OSRM HTTP endpoint (e.g. `http://localhost:5000`).
#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    endpoint: String,
}

impl OsrmRouter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, RoutingError> {
        let url = Url::parse(url)
            .map_err(|err| RoutingError::Unavailable(format!("failed to build OSRM URL: {err}")))?;
        let response = self.client.get(url).send().map_err(transport_error)?;
        response.json::<T>().map_err(transport_error)
    }

    /// Snap a single coordinate to the nearest road segment.
    pub fn snap_nearest(&self, point: LatLng) -> Result<LatLng, RoutingError> {
        let url = format!(
            "{}/nearest/v1/driving/{:.6},{:.6}",
            self.endpoint,
            point.lng(),
            point.lat()
        );
        let parsed: OsrmNearestResponse = self.get(&url)?;
        parse_nearest_response(parsed)
    }
}

fn transport_error(err: reqwest::Error) -> RoutingError {
    if err.is_timeout() {
        RoutingError::Unavailable("request timed out".to_string())
    } else if err.is_connect() {
        RoutingError::Unavailable(format!("connection failed: {err}"))
    } else {
        RoutingError::Unavailable(err.to_string())
    }
}

impl Router for OsrmRouter {
    fn estimate(&self, origin: LatLng, destination: LatLng) -> Result<Route, RoutingError> {
        let url = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson",
            self.endpoint,
            origin.lng(),
            origin.lat(),
            destination.lng(),
            destination.lat(),
        );
        let parsed: OsrmRouteResponse = self.get(&url)?;
        let route = parse_route_response(parsed, origin, destination);
        if let Err(err) = &route {
            debug!(%err, "osrm route query failed");
        }
        route
    }
}

/// Minimal OSRM JSON response structures.
#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRouteResponse {
    code: String,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64, // metres
    duration: f64, // seconds
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<Vec<f64>>, // [lng, lat]
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmNearestResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<OsrmNearestWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmNearestWaypoint {
    location: [f64; 2],
}

pub(crate) fn parse_route_response(
    resp: OsrmRouteResponse,
    origin: LatLng,
    destination: LatLng,
) -> Result<Route, RoutingError> {
    match resp.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingError::NoRoute),
        other => return Err(RoutingError::Unavailable(format!("OSRM answered {other}"))),
    }

    let route = resp
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RoutingError::NoRoute)?;

    // OSRM returns [lng, lat]; anything malformed is dropped.
    let path: Vec<LatLng> = route
        .geometry
        .map(|geometry| {
            geometry
                .coordinates
                .iter()
                .filter(|c| c.len() >= 2)
                .filter_map(|c| LatLng::new(c[1], c[0]).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(Route {
        origin,
        destination,
        path,
        distance_km: route.distance / 1000.0,
        duration_secs: route.duration,
    })
}

pub(crate) fn parse_nearest_response(resp: OsrmNearestResponse) -> Result<LatLng, RoutingError> {
    match resp.code.as_str() {
        "Ok" => {}
        "NoSegment" => return Err(RoutingError::NoRoute),
        other => return Err(RoutingError::Unavailable(format!("OSRM answered {other}"))),
    }
    let waypoint = resp.waypoints.first().ok_or(RoutingError::NoRoute)?;
    LatLng::new(waypoint.location[1], waypoint.location[0])
        .map_err(|err| RoutingError::Unavailable(format!("invalid snapped coordinate: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_location, test_location_offset};

    #[test]
    fn parses_successful_route() {
        let body = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 1520.5,
                "duration": 183.2,
                "geometry": {"coordinates": [[-122.41, 37.77], [-122.40, 37.78]]}
            }]
        }"#;
        let resp: OsrmRouteResponse = serde_json::from_str(body).expect("json");
        let route = parse_route_response(resp, test_location(), test_location_offset(0.01, 0.01))
            .expect("route");
        assert!((route.distance_km - 1.5205).abs() < 1e-9);
        assert!((route.duration_secs - 183.2).abs() < 1e-9);
        assert_eq!(route.path.len(), 2);
        assert!((route.path[0].lat() - 37.77).abs() < 1e-9);
    }

    #[test]
    fn distinguishes_no_route_from_failure() {
        let no_route: OsrmRouteResponse =
            serde_json::from_str(r#"{"code": "NoRoute", "routes": []}"#).expect("json");
        assert_eq!(
            parse_route_response(no_route, test_location(), test_location()),
            Err(RoutingError::NoRoute)
        );

        let bad: OsrmRouteResponse =
            serde_json::from_str(r#"{"code": "InvalidQuery"}"#).expect("json");
        assert!(parse_route_response(bad, test_location(), test_location())
            .expect_err("error")
            .is_unavailable());
    }

    #[test]
    fn parses_nearest_waypoint() {
        let resp: OsrmNearestResponse = serde_json::from_str(
            r#"{"code": "Ok", "waypoints": [{"location": [13.40, 52.52], "name": "Unter den Linden"}]}"#,
        )
        .expect("json");
        let snapped = parse_nearest_response(resp).expect("snap");
        assert!((snapped.lat() - 52.52).abs() < 1e-9);
        assert!((snapped.lng() - 13.40).abs() < 1e-9);
    }

    #[test]
    fn unreachable_server_is_unavailable() {
        let router =
            OsrmRouter::new("http://127.0.0.1:9", Duration::from_millis(200)).expect("client");
        let err = router
            .estimate(test_location(), test_location_offset(0.01, 0.0))
            .expect_err("no server on the discard port");
        assert!(err.is_unavailable());
    }
}
