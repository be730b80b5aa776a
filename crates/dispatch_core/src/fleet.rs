//! Fleet stations and initial vehicle placement.

use std::collections::HashMap;
use std::path::Path;

use bevy_ecs::prelude::{Entity, Resource};
use geojson::Value;
use h3o::LatLng;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::ecs::{Vehicle, VehicleId};
use crate::error::DataError;
use crate::geofence::{geometries, read_geojson, Geofence, OutOfBoundsPolicy, Placement};

/// Entity of every vehicle, keyed by id.
#[derive(Debug, Default, Resource)]
pub struct VehicleIndex(pub HashMap<VehicleId, Entity>);

impl VehicleIndex {
    pub fn get(&self, id: VehicleId) -> Option<Entity> {
        self.0.get(&id).copied()
    }
}

/// Station points from a GeoJSON file (`Point` and `MultiPoint` geometries, file
/// order). Each point is checked against the geofence with `policy`.
pub fn load_stations(
    path: &Path,
    geofence: &Geofence,
    policy: OutOfBoundsPolicy,
) -> Result<Vec<LatLng>, DataError> {
    let geojson = read_geojson(path)?;
    let mut raw = Vec::new();
    for geometry in geometries(&geojson) {
        match &geometry.value {
            Value::Point(position) => raw.push(position.clone()),
            Value::MultiPoint(positions) => raw.extend(positions.iter().cloned()),
            _ => {}
        }
    }

    let mut stations = Vec::with_capacity(raw.len());
    for position in raw {
        let point = match position.as_slice() {
            [lng, lat, ..] => LatLng::new(*lat, *lng).map_err(|err| {
                DataError::Geometry(format!("invalid station coordinate: {err}"))
            })?,
            _ => {
                return Err(DataError::Geometry(
                    "station position has fewer than 2 values".into(),
                ))
            }
        };
        match geofence.place(point, policy) {
            Placement::Rejected => {
                warn!(lat = point.lat(), lng = point.lng(), "station outside geofence, skipped");
            }
            placement => stations.extend(placement.position()),
        }
    }
    info!(path = %path.display(), stations = stations.len(), "loaded fleet stations");
    Ok(stations)
}

/// `count` idle vehicles with ids `0..count`, each parked at a station drawn by
/// a generator seeded with `seed`.
pub fn place_vehicles(stations: &[LatLng], count: usize, seed: u64) -> Result<Vec<Vehicle>, DataError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if stations.is_empty() {
        return Err(DataError::Geometry(format!(
            "no usable stations to place {count} vehicles"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count)
        .map(|i| {
            let station = stations[rng.gen_range(0..stations.len())];
            Vehicle::new(VehicleId(i as u64), station)
        })
        .collect())
}
