use serde::{Deserialize, Serialize};

/// Location count of a single cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStats {
    pub cell_id: String,
    pub locations: usize,
    pub subscribers: usize,
}

/// Index-wide statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of save operations processed (local and replicated)
    pub operations_count: u64,
    /// Number of identities currently tracked
    pub record_count: usize,
    /// Events discarded because a subscriber sink was full
    pub dropped_events: u64,
    /// One entry per cell ever created, sorted by cell id
    pub cells: Vec<CellStats>,
}

impl IndexStats {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn locations_in(&self, cell_id: &str) -> usize {
        self.cells
            .iter()
            .find(|c| c.cell_id == cell_id)
            .map(|c| c.locations)
            .unwrap_or(0)
    }
}
