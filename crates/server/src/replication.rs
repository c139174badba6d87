//! Replication of the spatial index over the gossip transport.
//!
//! Two channels:
//! - deltas: one record per message, queued on a transmit-limited queue and
//!   piggybacked on gossip. A newer delta for the same id replaces a queued one.
//! - snapshots: the full registry, exchanged on join and on every push/pull.
//!
//! Incoming deltas and snapshots go straight to [`SpatialIndex::save`] and are never
//! re-queued, so replication cannot loop. Undecodable payloads are logged and
//! dropped.

use bytes::Bytes;
use geodb::{GeoDbError, LocationRecord, SpatialIndex};
use geodb_cluster::{ClusterConfig, ClusterSize, Delegate, TransmitLimitedQueue};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub fn encode_delta(record: &LocationRecord) -> geodb::Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| GeoDbError::Transport(e.to_string()))
}

pub fn decode_delta(buf: &[u8]) -> geodb::Result<LocationRecord> {
    bincode::deserialize(buf).map_err(|e| GeoDbError::Transport(e.to_string()))
}

pub fn encode_snapshot(records: &[LocationRecord]) -> geodb::Result<Vec<u8>> {
    bincode::serialize(records).map_err(|e| GeoDbError::Transport(e.to_string()))
}

pub fn decode_snapshot(buf: &[u8]) -> geodb::Result<Vec<LocationRecord>> {
    bincode::deserialize(buf).map_err(|e| GeoDbError::Transport(e.to_string()))
}

pub struct ReplicationDelegate {
    index: Arc<SpatialIndex>,
    broadcasts: TransmitLimitedQueue,
    deltas_applied: AtomicU64,
    payloads_dropped: AtomicU64,
}

impl ReplicationDelegate {
    pub fn new(
        index: Arc<SpatialIndex>,
        retransmit_mult: usize,
        max_queue_depth: usize,
        cluster_size: ClusterSize,
    ) -> Self {
        Self {
            index,
            broadcasts: TransmitLimitedQueue::new(retransmit_mult, max_queue_depth, cluster_size),
            deltas_applied: AtomicU64::new(0),
            payloads_dropped: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        index: Arc<SpatialIndex>,
        config: &ClusterConfig,
        cluster_size: ClusterSize,
    ) -> Self {
        Self::new(
            index,
            config.retransmit_mult,
            config.max_queue_depth,
            cluster_size,
        )
    }

    pub fn index(&self) -> &Arc<SpatialIndex> {
        &self.index
    }

    /// Queue a delta for a record that was saved locally.
    pub fn broadcast(&self, id: &str, latitude: f64, longitude: f64) {
        let record = LocationRecord::new(id, latitude, longitude);
        match encode_delta(&record) {
            Ok(buf) => self.broadcasts.queue_keyed(record.id, buf),
            Err(e) => warn!("Failed to encode delta for {}: {}", id, e),
        }
    }

    /// Apply a delta received from a peer. Retransmitted copies of a delta that is
    /// already applied change nothing. Returns whether the index changed.
    pub fn apply_delta(&self, buf: &[u8]) -> geodb::Result<bool> {
        let record = decode_delta(buf)?;
        let changed =
            self.index
                .save_if_changed(&record.id, record.latitude, record.longitude)?;
        if changed {
            self.deltas_applied.fetch_add(1, Ordering::Relaxed);
        }
        Ok(changed)
    }

    /// Replay a peer's full snapshot. Returns the number of records that changed.
    pub fn apply_snapshot(&self, buf: &[u8]) -> geodb::Result<usize> {
        let records = decode_snapshot(buf)?;
        Ok(self.index.merge(records))
    }

    pub fn queued(&self) -> usize {
        self.broadcasts.num_queued()
    }

    pub fn deltas_applied(&self) -> u64 {
        self.deltas_applied.load(Ordering::Relaxed)
    }

    /// Deltas and snapshots that could not be decoded or applied.
    pub fn payloads_dropped(&self) -> u64 {
        self.payloads_dropped.load(Ordering::Relaxed)
    }
}

impl Delegate for ReplicationDelegate {
    fn notify_msg(&self, msg: &[u8]) {
        if msg.is_empty() {
            return;
        }
        if let Err(e) = self.apply_delta(msg) {
            self.payloads_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping replicated delta: {}", e);
        }
    }

    fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Bytes> {
        self.broadcasts.get_broadcasts(overhead, limit)
    }

    fn local_state(&self, join: bool) -> Vec<u8> {
        let records = self.index.snapshot();
        if join {
            debug!("Sharing {} records with a joining node", records.len());
        } else {
            debug!("Sharing {} records for routine sync", records.len());
        }

        encode_snapshot(&records).unwrap_or_else(|e| {
            warn!("Failed to encode local state: {}", e);
            Vec::new()
        })
    }

    fn merge_remote_state(&self, buf: &[u8], join: bool) {
        if buf.is_empty() {
            return;
        }
        match self.apply_snapshot(buf) {
            Ok(applied) => debug!(
                "Merged remote state ({}): {} records changed",
                if join { "join" } else { "sync" },
                applied
            ),
            Err(e) => {
                self.payloads_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping remote state: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for ReplicationDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationDelegate")
            .field("records", &self.index.len())
            .field("queued", &self.queued())
            .finish()
    }
}
