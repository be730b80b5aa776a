//! Test helpers shared by unit tests, integration tests and benches.
//!
//! Every fixture is anchored on one H3 cell so tests reuse the same geography.

use h3o::{CellIndex, LatLng};

use crate::geofence::Geofence;

/// A standard test cell used across test files for consistency.
/// This is a valid H3 cell at resolution 9 in the San Francisco Bay Area.
pub const TEST_CELL: u64 = 0x8a1fb46622dffff;

/// Get the test cell as a `CellIndex`.
///
/// # Panics
///
/// Panics if the test cell constant is invalid (should never happen).
pub fn test_cell() -> CellIndex {
    CellIndex::try_from(TEST_CELL).expect("TEST_CELL should be a valid H3 cell")
}

/// Centre of the test cell.
pub fn test_location() -> LatLng {
    LatLng::from(test_cell())
}

/// The test location shifted by the given degrees.
///
/// # Panics
///
/// Panics if the result is not a valid coordinate.
pub fn test_location_offset(dlat: f64, dlng: f64) -> LatLng {
    let base = test_location();
    LatLng::new(base.lat() + dlat, base.lng() + dlng).expect("offset location should be valid")
}

/// Axis-aligned square around the test location, `half_side` degrees each way.
///
/// # Panics
///
/// Panics if the square cannot form a valid geofence.
pub fn test_geofence(half_side: f64) -> Geofence {
    let c = test_location();
    let ring = vec![
        (c.lng() - half_side, c.lat() - half_side),
        (c.lng() + half_side, c.lat() - half_side),
        (c.lng() + half_side, c.lat() + half_side),
        (c.lng() - half_side, c.lat() + half_side),
        (c.lng() - half_side, c.lat() - half_side),
    ];
    Geofence::from_ring(ring).expect("square geofence should be valid")
}
