//! In-memory geospatial index partitioned into geohash cells, with live change
//! streams per cell.
//!
//! ## Features
//! - **Partitioning**: every identity lives in exactly one cell, the geohash of its
//!   current position at [`CELL_RESOLUTION`]
//! - **Change streams**: cells emit `Added` / `Updated` / `Deleted` events to
//!   bounded subscriber sinks that never block writers
//! - **Replication hooks**: [`SpatialIndex::snapshot`] and [`SpatialIndex::merge`]
//!   back full-state anti-entropy between nodes
//!
//! ```rust
//! use geodb::{SpatialIndex, SubscriberId, cell_of};
//!
//! let index = SpatialIndex::new();
//! let cell = cell_of(37.7749, -122.4194);
//!
//! let (sink, mut events) = index.new_sink();
//! index.subscribe(&cell, SubscriberId::new(), sink)?;
//!
//! index.save("ac1", 37.7749, -122.4194)?;
//! index.save("ac1", 37.7750, -122.4195)?;
//!
//! assert!(events.try_recv().unwrap().is_added());
//! assert!(events.try_recv().unwrap().is_updated());
//! # Ok::<(), geodb::GeoDbError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;

pub use builder::IndexBuilder;
pub use compute::{CELL_RESOLUTION, cell_of, is_valid_cell_id};
pub use config::Config;
pub use db::{Cell, Delivery, EventSink, EventStream, SpatialIndex, SubscriberId};
pub use error::{GeoDbError, Result};
pub use ingest::{LocationSink, ValidatingSink};

pub use geodb_types::{CellStats, ChangeEvent, ChangeKind, IndexStats, LocationRecord};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{Config, GeoDbError, IndexBuilder, Result, SpatialIndex};

    pub use crate::{EventSink, EventStream, SubscriberId};

    pub use crate::{ChangeEvent, ChangeKind, LocationRecord};

    pub use crate::{LocationSink, ValidatingSink};

    pub use crate::compute::{cell_of, validation};
}
