//! Hooks through which an application rides on the membership protocol.

use bytes::Bytes;

/// Application callbacks invoked by the [`Memberlist`](crate::Memberlist).
///
/// Calls happen on gossip tasks and must not block for long.
pub trait Delegate: Send + Sync + 'static {
    /// Opaque metadata advertised with the local node.
    fn node_meta(&self, _limit: usize) -> Vec<u8> {
        Vec::new()
    }

    /// A user broadcast received from a peer.
    fn notify_msg(&self, msg: &[u8]);

    /// Pending broadcasts to piggyback on an outgoing message. Each message costs
    /// `overhead + len` bytes against `limit`.
    fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Bytes>;

    /// Full local state for a push/pull exchange. `join` is set while joining.
    fn local_state(&self, join: bool) -> Vec<u8>;

    /// Full state received from a peer in a push/pull exchange.
    fn merge_remote_state(&self, buf: &[u8], join: bool);
}
