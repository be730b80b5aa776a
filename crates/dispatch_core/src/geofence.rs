//! Service-area polygon and the out-of-bounds policy applied to positions.
//!
//! Coordinates are stored as `geo` points with `x = lng`, `y = lat`, matching
//! GeoJSON axis order.

use std::fs;
use std::path::Path;

use geo::prelude::{ClosestPoint, Intersects};
use geo::{Closest, Coord, Line, LineString, Point, Polygon};
use geojson::{GeoJson, Geometry, Value};
use h3o::LatLng;
use serde::Deserialize;

use crate::error::DataError;

/// What to do with a demand or vehicle position outside the geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfBoundsPolicy {
    /// Drop the position (and whatever carries it).
    #[default]
    Reject,
    /// Move the position to the nearest point on the boundary.
    Clamp,
    /// Keep the position as it is.
    Ignore,
}

/// Outcome of checking one position against the geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Inside(LatLng),
    Clamped(LatLng),
    Outside(LatLng),
    Rejected,
}

impl Placement {
    /// The usable position, if any.
    pub fn position(self) -> Option<LatLng> {
        match self {
            Placement::Inside(p) | Placement::Clamped(p) | Placement::Outside(p) => Some(p),
            Placement::Rejected => None,
        }
    }
}

/// Immutable service-area polygon.
#[derive(Debug, Clone)]
pub struct Geofence {
    polygon: Polygon<f64>,
}

impl Geofence {
    /// Build from a ring of `(lng, lat)` pairs. The ring must be explicitly closed,
    /// have at least three distinct vertices and must not cross itself.
    pub fn from_ring(ring: Vec<(f64, f64)>) -> Result<Self, DataError> {
        if ring.len() < 4 {
            return Err(DataError::Geometry(format!(
                "geofence ring has {} positions, need at least 4",
                ring.len()
            )));
        }
        if ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(DataError::Geometry("geofence ring has a non-finite coordinate".into()));
        }
        if ring.first() != ring.last() {
            return Err(DataError::Geometry("geofence ring is not closed".into()));
        }

        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.len());
        for (x, y) in ring {
            let c = Coord { x, y };
            if coords.last() != Some(&c) {
                coords.push(c);
            }
        }
        // `coords` still ends on the closing vertex.
        if coords.len() < 4 {
            return Err(DataError::Geometry(
                "geofence ring needs at least 3 distinct vertices".into(),
            ));
        }
        if let Some((a, b)) = first_crossing(&coords) {
            return Err(DataError::Geometry(format!(
                "geofence ring intersects itself (segments {a} and {b})"
            )));
        }

        Ok(Self {
            polygon: Polygon::new(LineString::from(coords), Vec::new()),
        })
    }

    /// Load the first polygon found in a GeoJSON file (`Polygon`, or the first part
    /// of a `MultiPolygon`). Holes are ignored.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let geojson = read_geojson(path)?;
        let ring = geometries(&geojson)
            .into_iter()
            .find_map(|geometry| match &geometry.value {
                Value::Polygon(rings) => rings.first().cloned(),
                Value::MultiPolygon(polygons) => {
                    polygons.first().and_then(|rings| rings.first()).cloned()
                }
                _ => None,
            })
            .ok_or_else(|| {
                DataError::Geometry(format!("{} contains no polygon", path.display()))
            })?;

        let ring = ring
            .iter()
            .map(|pos| match pos.as_slice() {
                [x, y, ..] => Ok((*x, *y)),
                _ => Err(DataError::Geometry("geofence position has fewer than 2 values".into())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_ring(ring)
    }

    /// True if the point is inside the polygon or on its boundary.
    pub fn contains(&self, point: LatLng) -> bool {
        self.polygon.intersects(&to_point(point))
    }

    /// Nearest point of the polygon to `point` (the point itself when inside).
    pub fn clamp(&self, point: LatLng) -> LatLng {
        if self.contains(point) {
            return point;
        }
        match self.polygon.exterior().closest_point(&to_point(point)) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => {
                LatLng::new(p.y(), p.x()).unwrap_or(point)
            }
            Closest::Indeterminate => point,
        }
    }

    /// Apply the out-of-bounds policy to a position.
    pub fn place(&self, point: LatLng, policy: OutOfBoundsPolicy) -> Placement {
        if self.contains(point) {
            return Placement::Inside(point);
        }
        match policy {
            OutOfBoundsPolicy::Reject => Placement::Rejected,
            OutOfBoundsPolicy::Clamp => Placement::Clamped(self.clamp(point)),
            OutOfBoundsPolicy::Ignore => Placement::Outside(point),
        }
    }
}

fn to_point(point: LatLng) -> Point<f64> {
    Point::new(point.lng(), point.lat())
}

/// First pair of non-adjacent ring segments that touch, if any.
fn first_crossing(coords: &[Coord<f64>]) -> Option<(usize, usize)> {
    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 2)..n {
            // First and last segment share the closing vertex.
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

pub(crate) fn read_geojson(path: &Path) -> Result<GeoJson, DataError> {
    let raw = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    raw.parse::<GeoJson>().map_err(|source| DataError::GeoJson {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// All geometries of a GeoJSON document in file order, collections flattened.
pub(crate) fn geometries(geojson: &GeoJson) -> Vec<&Geometry> {
    fn flatten<'a>(geometry: &'a Geometry, out: &mut Vec<&'a Geometry>) {
        if let Value::GeometryCollection(children) = &geometry.value {
            for child in children {
                flatten(child, out);
            }
        } else {
            out.push(geometry);
        }
    }

    let mut out = Vec::new();
    match geojson {
        GeoJson::Geometry(geometry) => flatten(geometry, &mut out),
        GeoJson::Feature(feature) => {
            if let Some(geometry) = &feature.geometry {
                flatten(geometry, &mut out);
            }
        }
        GeoJson::FeatureCollection(collection) => {
            for feature in &collection.features {
                if let Some(geometry) = &feature.geometry {
                    flatten(geometry, &mut out);
                }
            }
        }
    }
    out
}
