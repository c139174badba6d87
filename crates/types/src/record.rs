use serde::{Deserialize, Serialize};

/// Current position of a tracked identity.
///
/// The identity is the only durable key; coordinates are overwritten on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationRecord {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }

    /// `(latitude, longitude)`
    #[inline]
    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    #[inline]
    pub fn set_position(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }
}
