//! Validation for geographic coordinates.
//!
//! Used at the ingestion boundary only. [`crate::SpatialIndex::save`] never checks
//! ranges; it hashes whatever it is given.

use crate::error::{GeoDbError, Result};

/// Validates a latitude/longitude pair.
///
/// Latitude: [-90.0, 90.0], Longitude: [-180.0, 180.0]
///
/// # Examples
///
/// ```
/// use geodb::compute::validation::validate_coordinates;
///
/// // Valid point
/// assert!(validate_coordinates(40.7128, -74.0060).is_ok());
///
/// // Invalid latitude
/// assert!(validate_coordinates(999.0, -74.0).is_err());
///
/// // Invalid longitude
/// assert!(validate_coordinates(40.0, 200.0).is_err());
/// ```
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() {
        return Err(GeoDbError::InvalidCoordinates(format!(
            "Latitude must be finite, got: {}",
            latitude
        )));
    }

    if !longitude.is_finite() {
        return Err(GeoDbError::InvalidCoordinates(format!(
            "Longitude must be finite, got: {}",
            longitude
        )));
    }

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(GeoDbError::InvalidCoordinates(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            latitude
        )));
    }

    if !(-180.0..=180.0).contains(&longitude) {
        return Err(GeoDbError::InvalidCoordinates(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            longitude
        )));
    }

    Ok(())
}

/// Validates a location identity.
pub fn validate_identity(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(GeoDbError::InvalidIdentity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_coordinates() {
        assert!(validate_coordinates(0.0, 0.0).is_ok());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert!(validate_coordinates(37.7749, -122.4194).is_ok());
    }

    #[test]
    fn test_invalid_latitude() {
        let err = validate_coordinates(999.0, 0.0).unwrap_err();
        assert!(matches!(err, GeoDbError::InvalidCoordinates(_)));
        assert!(validate_coordinates(-90.1, 0.0).is_err());
    }

    #[test]
    fn test_invalid_longitude() {
        assert!(validate_coordinates(0.0, 180.5).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
    }

    #[test]
    fn test_non_finite() {
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
        assert!(validate_coordinates(f64::NEG_INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_identity() {
        assert!(matches!(
            validate_identity(""),
            Err(GeoDbError::InvalidIdentity)
        ));
        assert!(validate_identity("ac1").is_ok());
    }
}
