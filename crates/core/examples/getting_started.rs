use geodb::prelude::*;
use std::sync::Arc;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug to see detailed logs)
    env_logger::init();

    println!("=== GeoDB - Getting Started ===\n");

    let index = Arc::new(SpatialIndex::builder().subscriber_buffer(64).build()?);

    // === SUBSCRIBE ===
    let sf = cell_of(37.7749, -122.4194);
    let (sink, mut events) = index.new_sink();
    index.subscribe(&sf, SubscriberId::new(), sink)?;
    println!("Subscribed to cell {}\n", sf);

    // === WRITE ===
    index.save("ac1", 37.7749, -122.4194)?;
    index.save("ac1", 37.7750, -122.4195)?;
    index.save("ac1", 40.7128, -74.0060)?; // leaves the cell

    while let Ok(event) = events.try_recv() {
        println!("   {:?} {} at ({}, {})", event.kind, event.record_id, event.latitude, event.longitude);
    }

    // === INGESTION BOUNDARY ===
    let pipeline = ValidatingSink::new(Arc::clone(&index));
    if let Err(e) = pipeline.save("ac2", 999.0, 0.0) {
        println!("\nRejected at the boundary: {}", e);
    }

    let stats = index.stats();
    println!(
        "\n{} records in {} cells after {} operations",
        stats.record_count,
        stats.cell_count(),
        stats.operations_count
    );

    Ok(())
}
