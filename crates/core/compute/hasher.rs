//! Spatial hashing of coordinates into cell identifiers.
//!
//! Cells are geohash prefixes of a fixed length. Every node of a cluster must be
//! built with the same [`CELL_RESOLUTION`]; nodes with different resolutions would
//! partition the same record into different cells without any error.

use geohash::Coord;

/// Geohash length used for every cell (~39km x 20km at the equator).
pub const CELL_RESOLUTION: usize = 4;

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Map a coordinate pair to the identifier of the cell containing it.
///
/// Deterministic and total: coordinates outside the geographic domain are folded
/// back into it (latitude clamped, longitude wrapped, non-finite values treated as
/// zero) so that every record has a cell. Range validation belongs to callers.
///
/// ```
/// use geodb::compute::hasher::cell_of;
///
/// assert_eq!(cell_of(37.7749, -122.4194), cell_of(37.7750, -122.4195));
/// assert_ne!(cell_of(37.7749, -122.4194), cell_of(40.7128, -74.0060));
/// ```
pub fn cell_of(latitude: f64, longitude: f64) -> String {
    let coord = Coord {
        x: normalize_longitude(longitude),
        y: normalize_latitude(latitude),
    };

    geohash::encode(coord, CELL_RESOLUTION).unwrap_or_else(|e| {
        log::error!("geohash encode failed for ({latitude}, {longitude}): {e}");
        "invalid".to_string()
    })
}

/// Whether `cell_id` names a cell at the configured resolution.
pub fn is_valid_cell_id(cell_id: &str) -> bool {
    cell_id.len() == CELL_RESOLUTION && cell_id.bytes().all(|b| BASE32.contains(&b))
}

#[inline]
fn normalize_latitude(latitude: f64) -> f64 {
    if !latitude.is_finite() {
        return 0.0;
    }
    latitude.clamp(-90.0, 90.0)
}

#[inline]
fn normalize_longitude(longitude: f64) -> f64 {
    if !longitude.is_finite() {
        return 0.0;
    }
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_has_configured_length() {
        let cell = cell_of(37.7749, -122.4194);
        assert_eq!(cell.len(), CELL_RESOLUTION);
        assert!(is_valid_cell_id(&cell));
        assert_eq!(cell, "9q8y");
    }

    #[test]
    fn test_deterministic() {
        for _ in 0..10 {
            assert_eq!(cell_of(51.5074, -0.1278), cell_of(51.5074, -0.1278));
        }
    }

    #[test]
    fn test_nearby_points_share_cell() {
        assert_eq!(cell_of(37.7749, -122.4194), cell_of(37.7750, -122.4195));
    }

    #[test]
    fn test_distant_points_differ() {
        assert_ne!(cell_of(37.7749, -122.4194), cell_of(40.7128, -74.0060));
    }

    #[test]
    fn test_out_of_range_coordinates_still_hash() {
        let cell = cell_of(999.0, 1000.0);
        assert!(is_valid_cell_id(&cell));
        assert_eq!(cell, cell_of(90.0, normalize_longitude(1000.0)));

        let cell = cell_of(f64::NAN, f64::INFINITY);
        assert_eq!(cell, cell_of(0.0, 0.0));
    }

    #[test]
    fn test_longitude_wraps() {
        assert!((normalize_longitude(190.0) - -170.0).abs() < 1e-9);
        assert!((normalize_longitude(-190.0) - 170.0).abs() < 1e-9);
        assert_eq!(normalize_longitude(180.0), 180.0);
    }

    #[test]
    fn test_invalid_cell_ids() {
        assert!(!is_valid_cell_id(""));
        assert!(!is_valid_cell_id("9q8"));
        assert!(!is_valid_cell_id("9q8yy"));
        // 'a', 'i', 'l', 'o' are not in the geohash alphabet
        assert!(!is_valid_cell_id("9q8a"));
        assert!(!is_valid_cell_id("86283082fffffff"));
    }
}
