//! Index builder
//!
//! Collects configuration and validates it before constructing a [`SpatialIndex`].

use crate::config::Config;
use crate::db::SpatialIndex;
use crate::error::{GeoDbError, Result};

/// Builder for a [`SpatialIndex`] with non-default settings.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    config: Config,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Capacity of each subscriber sink.
    pub fn subscriber_buffer(mut self, capacity: usize) -> Self {
        self.config.subscriber_buffer = capacity;
        self
    }

    pub fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Build the index.
    pub fn build(self) -> Result<SpatialIndex> {
        self.config.validate().map_err(GeoDbError::InvalidConfig)?;
        Ok(SpatialIndex::with_config(self.config))
    }
}
