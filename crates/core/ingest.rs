//! The write surface offered to ingestion pipelines.
//!
//! A pipeline only needs `save(id, lat, lon)`. [`SpatialIndex`] implements it
//! without range checks; [`ValidatingSink`] is the boundary layer that rejects
//! impossible coordinates before they reach the index.

use crate::compute::validation::{validate_coordinates, validate_identity};
use crate::db::SpatialIndex;
use crate::error::Result;
use std::sync::Arc;

/// Something that accepts location writes.
pub trait LocationSink: Send + Sync {
    fn save(&self, id: &str, latitude: f64, longitude: f64) -> Result<()>;
}

impl LocationSink for SpatialIndex {
    fn save(&self, id: &str, latitude: f64, longitude: f64) -> Result<()> {
        SpatialIndex::save(self, id, latitude, longitude)
    }
}

impl<T: LocationSink + ?Sized> LocationSink for Arc<T> {
    fn save(&self, id: &str, latitude: f64, longitude: f64) -> Result<()> {
        (**self).save(id, latitude, longitude)
    }
}

/// Validates identity and coordinate ranges, then forwards to `inner`.
#[derive(Debug, Clone)]
pub struct ValidatingSink<S> {
    inner: S,
}

impl<S: LocationSink> ValidatingSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LocationSink> LocationSink for ValidatingSink<S> {
    fn save(&self, id: &str, latitude: f64, longitude: f64) -> Result<()> {
        validate_identity(id)?;
        validate_coordinates(latitude, longitude)?;
        self.inner.save(id, latitude, longitude)
    }
}
