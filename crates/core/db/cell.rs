//! A spatial partition: the records currently hashing to one cell id, plus the
//! sinks subscribed to its changes.
//!
//! Records are shared with the index (`SharedRecord`), so an in-place coordinate
//! update through the cell is visible through the registry and vice versa.

use geodb_types::event::ChangeEvent;
use geodb_types::record::LocationRecord;
use geodb_types::stats::CellStats;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::subscription::{Delivery, EventSink, SubscriberId};

/// A record owned by the index and referenced by exactly one cell.
pub type SharedRecord = Arc<RwLock<LocationRecord>>;

pub struct Cell {
    id: String,
    records: RwLock<HashMap<String, SharedRecord>>,
    subscribers: RwLock<HashMap<SubscriberId, EventSink>>,
    dropped_events: AtomicU64,
}

impl Cell {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            dropped_events: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a record and emit `Added`.
    ///
    /// # Panics
    /// If the cell already holds a record with the same id. The index guarantees a
    /// record lives in exactly one cell; reaching this is a partitioning bug.
    pub fn add(&self, record: SharedRecord) {
        let (record_id, latitude, longitude) = {
            let r = record.read();
            (r.id.clone(), r.latitude, r.longitude)
        };

        {
            let mut records = self.records.write();
            if records.contains_key(&record_id) {
                panic!(
                    "location {} already exists in cell {}; add should never have reached the cell",
                    record_id, self.id
                );
            }
            records.insert(record_id.clone(), record);
        }

        self.emit(ChangeEvent::added(&self.id, &record_id, latitude, longitude));
    }

    /// Move a held record to new coordinates in place and emit `Updated`.
    ///
    /// # Panics
    /// If the record is not held by this cell.
    pub fn update(&self, record: &SharedRecord, latitude: f64, longitude: f64) {
        let record_id = record.read().id.clone();

        if !self.records.read().contains_key(&record_id) {
            panic!(
                "location {} is not in cell {}; update should never have reached the cell",
                record_id, self.id
            );
        }

        let previous = {
            let mut r = record.write();
            let previous = r.position();
            r.set_position(latitude, longitude);
            previous
        };

        self.emit(ChangeEvent::updated(
            &self.id,
            &record_id,
            (latitude, longitude),
            previous,
        ));
    }

    /// Remove a record and emit `Deleted`. Absent ids are a no-op.
    pub fn delete(&self, record_id: &str) -> Option<SharedRecord> {
        let removed = self.records.write().remove(record_id)?;
        let (latitude, longitude) = removed.read().position();

        self.emit(ChangeEvent::deleted(&self.id, record_id, latitude, longitude));
        Some(removed)
    }

    /// Remove a record whose shared coordinates were already moved elsewhere,
    /// reporting `last_position` (its coordinates while it lived here).
    pub(crate) fn evict(&self, record_id: &str, last_position: (f64, f64)) -> Option<SharedRecord> {
        let removed = self.records.write().remove(record_id)?;
        let (latitude, longitude) = last_position;

        self.emit(ChangeEvent::deleted(&self.id, record_id, latitude, longitude));
        Some(removed)
    }

    /// Register `sink` under `subscriber`, replacing any previous sink for that id.
    ///
    /// Only events produced after this call are delivered.
    pub fn subscribe(&self, subscriber: SubscriberId, sink: EventSink) -> Option<EventSink> {
        self.subscribers.write().insert(subscriber, sink)
    }

    pub fn unsubscribe(&self, subscriber: &SubscriberId) -> bool {
        self.subscribers.write().remove(subscriber).is_some()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.records.read().contains_key(record_id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Copies of the records currently in the cell.
    pub fn records(&self) -> Vec<LocationRecord> {
        self.records
            .read()
            .values()
            .map(|r| r.read().clone())
            .collect()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CellStats {
        CellStats {
            cell_id: self.id.clone(),
            locations: self.len(),
            subscribers: self.subscriber_count(),
        }
    }

    fn emit(&self, event: ChangeEvent) {
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for (subscriber, sink) in subscribers.iter() {
                match sink.deliver(event.clone()) {
                    Delivery::Sent => {}
                    Delivery::Dropped => {
                        self.dropped_events.fetch_add(1, Ordering::Relaxed);
                        log::debug!(
                            "Subscriber {} of cell {} is full, dropping event for {}",
                            subscriber,
                            self.id,
                            event.record_id
                        );
                    }
                    Delivery::Closed => closed.push(*subscriber),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for subscriber in closed {
                // A re-subscribe may have installed a live sink in the meantime
                if subscribers.get(&subscriber).is_some_and(EventSink::is_closed) {
                    subscribers.remove(&subscriber);
                    log::debug!("Removed closed subscriber {} from cell {}", subscriber, self.id);
                }
            }
        }
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("locations", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodb_types::event::ChangeKind;

    fn shared(id: &str, lat: f64, lon: f64) -> SharedRecord {
        Arc::new(RwLock::new(LocationRecord::new(id, lat, lon)))
    }

    #[test]
    fn test_add_emits_added() {
        let cell = Cell::new("9q8y");
        let (sink, mut rx) = EventSink::channel(8);
        cell.subscribe(SubscriberId::new(), sink);

        cell.add(shared("ac1", 37.7749, -122.4194));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.cell_id, "9q8y");
        assert_eq!(event.record_id, "ac1");
        assert!(cell.contains("ac1"));
        assert_eq!(cell.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_add_twice_panics() {
        let cell = Cell::new("9q8y");
        cell.add(shared("ac1", 37.7749, -122.4194));
        cell.add(shared("ac1", 37.7749, -122.4194));
    }

    #[test]
    #[should_panic(expected = "is not in cell")]
    fn test_update_absent_panics() {
        let cell = Cell::new("9q8y");
        cell.update(&shared("ac1", 37.7749, -122.4194), 1.0, 1.0);
    }

    #[test]
    fn test_update_mutates_shared_record() {
        let cell = Cell::new("9q8y");
        let record = shared("ac1", 37.7749, -122.4194);
        cell.add(record.clone());

        let (sink, mut rx) = EventSink::channel(8);
        cell.subscribe(SubscriberId::new(), sink);

        cell.update(&record, 37.7750, -122.4195);

        // Visible through the caller's handle
        assert_eq!(record.read().position(), (37.7750, -122.4195));

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.kind,
            ChangeKind::Updated {
                prev_latitude: 37.7749,
                prev_longitude: -122.4194
            }
        );
        assert_eq!((event.latitude, event.longitude), (37.7750, -122.4195));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cell = Cell::new("9q8y");
        let (sink, mut rx) = EventSink::channel(8);
        cell.subscribe(SubscriberId::new(), sink);

        assert!(cell.delete("missing").is_none());
        assert!(rx.try_recv().is_err());

        cell.add(shared("ac1", 37.7749, -122.4194));
        let _ = rx.try_recv().unwrap();

        assert!(cell.delete("ac1").is_some());
        assert!(cell.delete("ac1").is_none());

        let event = rx.try_recv().unwrap();
        assert!(event.is_deleted());
        assert!(rx.try_recv().is_err());
        assert!(cell.is_empty());
    }

    #[test]
    fn test_new_subscriber_sees_no_history() {
        let cell = Cell::new("9q8y");
        cell.add(shared("ac1", 37.7749, -122.4194));

        let (sink, mut rx) = EventSink::channel(8);
        cell.subscribe(SubscriberId::new(), sink);
        assert!(rx.try_recv().is_err());

        cell.add(shared("ac2", 37.7749, -122.4194));
        assert_eq!(rx.try_recv().unwrap().record_id, "ac2");
    }

    #[test]
    fn test_resubscribe_replaces_sink() {
        let cell = Cell::new("9q8y");
        let subscriber = SubscriberId::new();

        let (first, mut first_rx) = EventSink::channel(8);
        let (second, mut second_rx) = EventSink::channel(8);
        assert!(cell.subscribe(subscriber, first).is_none());
        assert!(cell.subscribe(subscriber, second).is_some());
        assert_eq!(cell.subscriber_count(), 1);

        cell.add(shared("ac1", 1.0, 1.0));
        assert!(first_rx.try_recv().is_err());
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn test_slow_subscriber_does_not_block() {
        let cell = Cell::new("9q8y");
        let (sink, _rx) = EventSink::channel(1);
        cell.subscribe(SubscriberId::new(), sink);

        for i in 0..100 {
            cell.add(shared(&format!("ac{}", i), 1.0, 1.0));
        }

        assert_eq!(cell.len(), 100);
        assert_eq!(cell.dropped_events(), 99);
    }

    #[test]
    fn test_closed_subscriber_is_removed() {
        let cell = Cell::new("9q8y");
        let (sink, rx) = EventSink::channel(8);
        cell.subscribe(SubscriberId::new(), sink);
        drop(rx);

        cell.add(shared("ac1", 1.0, 1.0));
        assert_eq!(cell.subscriber_count(), 0);
    }
}
