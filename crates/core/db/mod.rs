//! The spatial index: global identity registry plus the cells it is partitioned into.
//!
//! Every write, local or replicated, goes through [`SpatialIndex::save`]. Writers are
//! serialized by a single coarse lock; cells carry their own locks so subscribers can
//! attach and read while writes are in flight. Event delivery never waits on a
//! subscriber.

use crate::compute::hasher::{cell_of, is_valid_cell_id};
use crate::config::Config;
use crate::error::{GeoDbError, Result};
use dashmap::DashMap;
use geodb_types::record::LocationRecord;
use geodb_types::stats::IndexStats;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

mod cell;
mod subscription;

pub use cell::{Cell, SharedRecord};
pub use subscription::{Delivery, EventSink, EventStream, SubscriberId};

/// Registry of every known identity, partitioned into geohash cells.
#[derive(Debug)]
pub struct SpatialIndex {
    records: DashMap<String, SharedRecord>,
    cells: DashMap<String, Arc<Cell>>,
    /// Serializes mutations of `records`/`cells` membership
    write_lock: Mutex<()>,
    ops_count: AtomicU64,
    config: Config,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            records: DashMap::new(),
            cells: DashMap::new(),
            write_lock: Mutex::new(()),
            ops_count: AtomicU64::new(0),
            config,
        }
    }

    pub fn builder() -> crate::builder::IndexBuilder {
        crate::builder::IndexBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record the current position of `id`.
    ///
    /// - unknown id: the record is created in its cell (`Added`)
    /// - same cell: coordinates change in place (`Updated`)
    /// - different cell: the record is added to the new cell first, then removed
    ///   from the old one, so it is always visible in at least one cell
    ///
    /// Coordinates are not range-checked here.
    pub fn save(&self, id: &str, latitude: f64, longitude: f64) -> Result<()> {
        if id.is_empty() {
            return Err(GeoDbError::InvalidIdentity);
        }

        let _guard = self.write_lock.lock();
        self.save_locked(id, latitude, longitude);
        Ok(())
    }

    /// [`save`](Self::save), except that a record already stored at exactly this
    /// position is left alone: no events, no operation counted.
    ///
    /// Returns whether the index changed.
    pub fn save_if_changed(&self, id: &str, latitude: f64, longitude: f64) -> Result<bool> {
        if id.is_empty() {
            return Err(GeoDbError::InvalidIdentity);
        }

        let _guard = self.write_lock.lock();
        let unchanged = self
            .records
            .get(id)
            .is_some_and(|r| r.read().position() == (latitude, longitude));
        if unchanged {
            return Ok(false);
        }
        self.save_locked(id, latitude, longitude);
        Ok(true)
    }

    /// Caller holds `write_lock`.
    fn save_locked(&self, id: &str, latitude: f64, longitude: f64) {
        self.ops_count.fetch_add(1, Ordering::Relaxed);

        let existing = self.records.get(id).map(|r| Arc::clone(r.value()));

        let Some(record) = existing else {
            let record = Arc::new(RwLock::new(LocationRecord::new(id, latitude, longitude)));
            let cell = self.cell_or_create(&cell_of(latitude, longitude));
            // Cell first, so a known id is always held by some cell
            cell.add(Arc::clone(&record));
            self.records.insert(id.to_string(), record);
            return;
        };

        let previous = record.read().position();
        let old_cell_id = cell_of(previous.0, previous.1);
        let new_cell_id = cell_of(latitude, longitude);

        if old_cell_id == new_cell_id {
            self.cell_or_create(&old_cell_id)
                .update(&record, latitude, longitude);
            return;
        }

        let old_cell = self.cell_or_create(&old_cell_id);
        let new_cell = self.cell_or_create(&new_cell_id);

        record.write().set_position(latitude, longitude);
        new_cell.add(Arc::clone(&record));
        old_cell.evict(id, previous);

        log::trace!("Moved {} from cell {} to {}", id, old_cell_id, new_cell_id);
    }

    /// Current position of `id`.
    pub fn get(&self, id: &str) -> Option<LocationRecord> {
        self.records.get(id).map(|r| r.read().clone())
    }

    /// Cell id currently holding `id`.
    pub fn cell_of_record(&self, id: &str) -> Option<String> {
        self.get(id).map(|r| cell_of(r.latitude, r.longitude))
    }

    pub fn cell(&self, cell_id: &str) -> Option<Arc<Cell>> {
        self.cells.get(cell_id).map(|c| Arc::clone(c.value()))
    }

    /// Ids of every cell created so far, sorted.
    pub fn cell_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cells.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Create a bounded sink sized by `Config::subscriber_buffer`.
    pub fn new_sink(&self) -> (EventSink, EventStream) {
        EventSink::channel(self.config.subscriber_buffer)
    }

    /// Attach `sink` to `cell_id`, creating the cell empty if no record has landed
    /// there yet.
    pub fn subscribe(&self, cell_id: &str, subscriber: SubscriberId, sink: EventSink) -> Result<()> {
        if !is_valid_cell_id(cell_id) {
            return Err(GeoDbError::InvalidCell(cell_id.to_string()));
        }

        if self.cell_or_create(cell_id).subscribe(subscriber, sink).is_some() {
            log::debug!("Subscriber {} re-subscribed to cell {}", subscriber, cell_id);
        }
        Ok(())
    }

    pub fn unsubscribe(&self, cell_id: &str, subscriber: &SubscriberId) -> bool {
        self.cell(cell_id)
            .map(|c| c.unsubscribe(subscriber))
            .unwrap_or(false)
    }

    /// Copies of every record, in no particular order.
    pub fn snapshot(&self) -> Vec<LocationRecord> {
        self.records.iter().map(|r| r.read().clone()).collect()
    }

    /// Replay `records` through [`save_if_changed`](Self::save_if_changed).
    /// Invalid entries and records already stored at the same position are
    /// skipped, so merging a peer's unchanged state emits no events.
    ///
    /// Returns the number of records applied.
    pub fn merge<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = LocationRecord>,
    {
        let mut applied = 0;
        for record in records {
            match self.save_if_changed(&record.id, record.latitude, record.longitude) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Skipping record {:?} during merge: {}", record.id, e),
            }
        }
        applied
    }

    pub fn operations_count(&self) -> u64 {
        self.ops_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> IndexStats {
        let mut cells: Vec<_> = self.cells.iter().map(|c| c.value().stats()).collect();
        cells.sort_by(|a, b| a.cell_id.cmp(&b.cell_id));

        let dropped_events = self.cells.iter().map(|c| c.value().dropped_events()).sum();

        IndexStats {
            operations_count: self.operations_count(),
            record_count: self.records.len(),
            dropped_events,
            cells,
        }
    }

    fn cell_or_create(&self, cell_id: &str) -> Arc<Cell> {
        let entry = self
            .cells
            .entry(cell_id.to_string())
            .or_insert_with(|| Arc::new(Cell::new(cell_id)));
        Arc::clone(entry.value())
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
