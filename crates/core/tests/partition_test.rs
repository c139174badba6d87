use geodb::{SpatialIndex, SubscriberId, cell_of};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// Each id sits in exactly one cell, the one its coordinates hash to.
fn assert_partitioned(index: &SpatialIndex) {
    for record in index.snapshot() {
        let expected = cell_of(record.latitude, record.longitude);
        let holders: Vec<String> = index
            .cell_ids()
            .into_iter()
            .filter(|id| index.cell(id).is_some_and(|c| c.contains(&record.id)))
            .collect();
        assert_eq!(holders, vec![expected], "record {}", record.id);
    }
}

fn track(i: usize) -> (f64, f64) {
    // Walks across many cells, wrapping around the globe
    let lat = ((i as f64) * 1.7) % 170.0 - 85.0;
    let lon = ((i as f64) * 3.1) % 350.0 - 175.0;
    (lat, lon)
}

#[test]
fn test_partition_invariant_under_sequential_moves() {
    let index = SpatialIndex::new();
    for step in 0..500 {
        let id = format!("ac{}", step % 7);
        let (lat, lon) = track(step);
        index.save(&id, lat, lon).unwrap();
    }

    assert_eq!(index.len(), 7);
    assert_partitioned(&index);
}

#[test]
fn test_partition_invariant_under_concurrent_writers() {
    let index = Arc::new(SpatialIndex::new());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for step in 0..250 {
                    // Writers share ids so moves race with each other
                    let id = format!("ac{}", step % 5);
                    let (lat, lon) = track(step * 4 + worker);
                    index.save(&id, lat, lon).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.len(), 5);
    assert_eq!(index.operations_count(), 1000);
    assert_partitioned(&index);
}

#[test]
fn test_subscriber_sees_only_its_cell() {
    let index = SpatialIndex::new();
    let sf = cell_of(37.7749, -122.4194);
    let (sink, mut events) = index.new_sink();
    index.subscribe(&sf, SubscriberId::new(), sink).unwrap();

    index.save("ac1", 40.7128, -74.0060).unwrap();
    index.save("ac2", 51.5074, -0.1278).unwrap();
    assert!(events.try_recv().is_err());

    index.save("ac3", 37.7749, -122.4194).unwrap();
    let ids: HashSet<String> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.record_id)
        .collect();
    assert_eq!(ids, HashSet::from(["ac3".to_string()]));
}

#[test]
fn test_replica_converges_from_snapshot() {
    let primary = SpatialIndex::new();
    for step in 0..100 {
        let (lat, lon) = track(step);
        primary.save(&format!("ac{}", step % 13), lat, lon).unwrap();
    }

    let replica = SpatialIndex::new();
    replica.merge(primary.snapshot());

    let mut left = primary.snapshot();
    let mut right = replica.snapshot();
    left.sort_by(|a, b| a.id.cmp(&b.id));
    right.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(left, right);
    assert_partitioned(&replica);
}
