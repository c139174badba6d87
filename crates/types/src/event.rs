use serde::{Deserialize, Serialize};

/// What happened to a record inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The record entered the cell (first save, or moved in from another cell).
    Added,
    /// The record moved within the cell.
    Updated {
        prev_latitude: f64,
        prev_longitude: f64,
    },
    /// The record left the cell.
    Deleted,
}

/// Transient notification produced by a cell mutation.
///
/// `latitude`/`longitude` are the coordinates the record had inside the emitting
/// cell: the new position for `Added` and `Updated`, the last in-cell position for
/// `Deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub cell_id: String,
    pub record_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn added(cell_id: &str, record_id: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            cell_id: cell_id.to_string(),
            record_id: record_id.to_string(),
            latitude,
            longitude,
            kind: ChangeKind::Added,
        }
    }

    pub fn updated(
        cell_id: &str,
        record_id: &str,
        (latitude, longitude): (f64, f64),
        (prev_latitude, prev_longitude): (f64, f64),
    ) -> Self {
        Self {
            cell_id: cell_id.to_string(),
            record_id: record_id.to_string(),
            latitude,
            longitude,
            kind: ChangeKind::Updated {
                prev_latitude,
                prev_longitude,
            },
        }
    }

    pub fn deleted(cell_id: &str, record_id: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            cell_id: cell_id.to_string(),
            record_id: record_id.to_string(),
            latitude,
            longitude,
            kind: ChangeKind::Deleted,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self.kind, ChangeKind::Added)
    }

    pub fn is_updated(&self) -> bool {
        matches!(self.kind, ChangeKind::Updated { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.kind, ChangeKind::Deleted)
    }
}
