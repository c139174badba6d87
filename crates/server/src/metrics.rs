//! Prometheus text rendering of index statistics.

use geodb::IndexStats;
use std::fmt::Write;

pub const OPS_PROCESSED: &str = "geo_db_grid_processed_ops_total";
pub const LOCATIONS: &str = "geo_db_grid_locations_total";

/// Render `stats` in the Prometheus text exposition format.
pub fn render(stats: &IndexStats) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "# HELP {OPS_PROCESSED} The total number of processed operations by the grid");
    let _ = writeln!(out, "# TYPE {OPS_PROCESSED} counter");
    let _ = writeln!(out, "{OPS_PROCESSED} {}", stats.operations_count);

    let _ = writeln!(out, "# HELP {LOCATIONS} The total number of locations in the grid");
    let _ = writeln!(out, "# TYPE {LOCATIONS} gauge");
    for cell in &stats.cells {
        let _ = writeln!(
            out,
            "{LOCATIONS}{{grid_name=\"{}\"}} {}",
            cell.cell_id, cell.locations
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodb::SpatialIndex;

    #[test]
    fn test_render() {
        let index = SpatialIndex::new();
        index.save("ac1", 37.7749, -122.4194).unwrap();
        index.save("ac2", 37.7749, -122.4194).unwrap();
        index.save("ac3", 40.7128, -74.0060).unwrap();

        let text = render(&index.stats());
        assert!(text.contains("# TYPE geo_db_grid_processed_ops_total counter"));
        assert!(text.contains("geo_db_grid_processed_ops_total 3\n"));
        assert!(text.contains("geo_db_grid_locations_total{grid_name=\"9q8y\"} 2\n"));
        assert!(text.contains("geo_db_grid_locations_total{grid_name=\"dr5r\"} 1\n"));
    }

    #[test]
    fn test_render_empty() {
        let text = render(&SpatialIndex::new().stats());
        assert!(text.contains("geo_db_grid_processed_ops_total 0\n"));
        assert!(!text.contains("grid_name"));
    }
}
