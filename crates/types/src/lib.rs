//! # geodb-types
//!
//! Plain data types shared by every GeoDB crate:
//!
//! - **Records**: `LocationRecord`, the current position of one tracked identity
//! - **Events**: `ChangeEvent` / `ChangeKind`, emitted by a cell on every mutation
//! - **Stats**: `IndexStats` / `CellStats`, counters consumed by metrics exposition
//!
//! All types are serializable with Serde.
//!
//! ```rust
//! use geodb_types::record::LocationRecord;
//!
//! let record = LocationRecord::new("ac1", 37.7749, -122.4194);
//! assert_eq!(record.position(), (37.7749, -122.4194));
//! ```

pub mod event;
pub mod record;
pub mod stats;

pub use event::{ChangeEvent, ChangeKind};
pub use record::LocationRecord;
pub use stats::{CellStats, IndexStats};
