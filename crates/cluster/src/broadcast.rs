//! Transmit-limited broadcast queue.
//!
//! Messages are piggybacked on gossip exchanges. Each message is handed out at most
//! `retransmit_mult * ceil(log10(n + 1))` times, where `n` is the current cluster
//! size, then forgotten. Least-transmitted messages go first. The queue is bounded:
//! past `max_depth` the most-transmitted (then oldest) messages are dropped.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared view of the number of live members, kept current by the memberlist.
#[derive(Debug, Clone)]
pub struct ClusterSize(Arc<AtomicUsize>);

impl ClusterSize {
    pub fn new() -> Self {
        Self(Arc::new(AtomicUsize::new(1)))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, n: usize) {
        self.0.store(n.max(1), Ordering::Relaxed);
    }
}

impl Default for ClusterSize {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of times a broadcast is sent in a cluster of `n` nodes.
pub fn retransmit_limit(retransmit_mult: usize, n: usize) -> usize {
    let scale = ((n + 1) as f64).log10().ceil() as usize;
    retransmit_mult * scale.max(1)
}

#[derive(Debug)]
struct Queued {
    key: Option<String>,
    msg: Bytes,
    transmits: usize,
    id: u64,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: Vec<Queued>,
    next_id: u64,
}

#[derive(Debug)]
pub struct TransmitLimitedQueue {
    retransmit_mult: usize,
    max_depth: usize,
    cluster_size: ClusterSize,
    inner: Mutex<QueueInner>,
}

impl TransmitLimitedQueue {
    pub fn new(retransmit_mult: usize, max_depth: usize, cluster_size: ClusterSize) -> Self {
        Self {
            retransmit_mult,
            max_depth: max_depth.max(1),
            cluster_size,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Queue an unkeyed broadcast.
    pub fn queue_broadcast(&self, msg: impl Into<Bytes>) {
        self.push(None, msg.into());
    }

    /// Queue a broadcast that supersedes any queued broadcast with the same key.
    pub fn queue_keyed(&self, key: impl Into<String>, msg: impl Into<Bytes>) {
        self.push(Some(key.into()), msg.into());
    }

    fn push(&self, key: Option<String>, msg: Bytes) {
        let mut inner = self.inner.lock();

        if let Some(k) = key.as_deref() {
            inner.items.retain(|q| q.key.as_deref() != Some(k));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.items.push(Queued {
            key,
            msg,
            transmits: 0,
            id,
        });

        if inner.items.len() > self.max_depth {
            let excess = inner.items.len() - self.max_depth;
            // Most transmitted first, then oldest
            inner
                .items
                .sort_by(|a, b| b.transmits.cmp(&a.transmits).then(a.id.cmp(&b.id)));
            inner.items.drain(..excess);
            tracing::debug!("Broadcast queue full, dropped {} messages", excess);
        }
    }

    /// Messages to piggyback on one outgoing gossip exchange.
    ///
    /// Each message costs `overhead + len` bytes against `limit`.
    pub fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Bytes> {
        let transmit_limit = retransmit_limit(self.retransmit_mult, self.cluster_size.get());
        let mut inner = self.inner.lock();

        // Fewest transmits first, newest first among equals
        inner
            .items
            .sort_by(|a, b| a.transmits.cmp(&b.transmits).then(b.id.cmp(&a.id)));

        let mut used = 0;
        let mut out = Vec::new();
        for item in inner.items.iter_mut() {
            let cost = overhead + item.msg.len();
            if used + cost > limit {
                continue;
            }
            used += cost;
            item.transmits += 1;
            out.push(item.msg.clone());
        }

        inner.items.retain(|q| q.transmits < transmit_limit);
        out
    }

    pub fn num_queued(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_queued() == 0
    }

    /// Drop everything queued.
    pub fn reset(&self) {
        self.inner.lock().items.clear();
    }
}
