//! Bounded event sinks attached to cells.
//!
//! A sink never blocks the mutation path: delivery is a `try_send` into a bounded
//! channel and a full channel drops the new event. A sink whose receiver is gone
//! reports `Closed` so the cell can forget it.

use geodb_types::event::ChangeEvent;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Stable identity of a subscribing session (one per read connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving half handed to the subscriber.
pub type EventStream = mpsc::Receiver<ChangeEvent>;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The sink was full; the event was discarded.
    Dropped,
    /// The receiver has been dropped.
    Closed,
}

/// Sending half registered on one or more cells.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ChangeEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Create a sink holding at most `capacity` undelivered events.
    pub fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub fn deliver(&self, event: ChangeEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Events discarded so far because the sink was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sink_drops_new_events() {
        let (sink, mut rx) = EventSink::channel(2);

        assert_eq!(sink.deliver(ChangeEvent::added("9q8y", "a", 1.0, 1.0)), Delivery::Sent);
        assert_eq!(sink.deliver(ChangeEvent::added("9q8y", "b", 1.0, 1.0)), Delivery::Sent);
        assert_eq!(sink.deliver(ChangeEvent::added("9q8y", "c", 1.0, 1.0)), Delivery::Dropped);
        assert_eq!(sink.dropped(), 1);

        // The oldest events survive
        assert_eq!(rx.try_recv().unwrap().record_id, "a");
        assert_eq!(rx.try_recv().unwrap().record_id, "b");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_sink() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);

        assert!(sink.is_closed());
        assert_eq!(sink.deliver(ChangeEvent::deleted("9q8y", "a", 0.0, 0.0)), Delivery::Closed);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
    }
}
