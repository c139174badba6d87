use bytes::Bytes;
use geodb_cluster::{
    BROADCAST_OVERHEAD, ClusterConfig, ClusterError, ClusterSize, Delegate, DnsDiscovery, Memberlist,
    TransmitLimitedQueue,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct TestDelegate {
    queue: TransmitLimitedQueue,
    received: Mutex<Vec<Vec<u8>>>,
    state: Vec<u8>,
    merged: Mutex<Vec<(Vec<u8>, bool)>>,
}

impl TestDelegate {
    fn new(size: ClusterSize, state: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            queue: TransmitLimitedQueue::new(4, 1024, size),
            received: Mutex::new(Vec::new()),
            state: state.to_vec(),
            merged: Mutex::new(Vec::new()),
        })
    }
}

impl Delegate for TestDelegate {
    fn notify_msg(&self, msg: &[u8]) {
        self.received.lock().push(msg.to_vec());
    }

    fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Bytes> {
        self.queue.get_broadcasts(overhead, limit)
    }

    fn local_state(&self, _join: bool) -> Vec<u8> {
        self.state.clone()
    }

    fn merge_remote_state(&self, buf: &[u8], join: bool) {
        self.merged.lock().push((buf.to_vec(), join));
    }
}

async fn node(name: &str, state: &[u8]) -> anyhow::Result<(Arc<Memberlist>, Arc<TestDelegate>)> {
    let size = ClusterSize::new();
    let delegate = TestDelegate::new(size.clone(), state);
    let config = ClusterConfig::local().with_node_name(name);
    let list = Memberlist::create(config, delegate.clone(), size).await?;
    Ok((list, delegate))
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_join_exchanges_state() -> anyhow::Result<()> {
    let (a, a_delegate) = node("a", b"state-a").await?;
    let (b, b_delegate) = node("b", b"state-b").await?;

    let joined = b.join(&[a.local_addr()]).await?;
    assert_eq!(joined, 1);
    assert_eq!(b.num_members(), 2);
    assert!(eventually(|| a.num_members() == 2).await);

    // Both sides merged the other's full state, flagged as a join
    assert!(b_delegate.merged.lock().contains(&(b"state-a".to_vec(), true)));
    assert!(a_delegate.merged.lock().contains(&(b"state-b".to_vec(), true)));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_broadcast_reaches_peer() -> anyhow::Result<()> {
    let (a, a_delegate) = node("a", b"").await?;
    let (b, b_delegate) = node("b", b"").await?;
    b.join(&[a.local_addr()]).await?;

    a_delegate.queue.queue_broadcast(Bytes::from_static(b"hello"));
    assert!(eventually(|| b_delegate.received.lock().contains(&b"hello".to_vec())).await);

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_third_node_learned_through_gossip() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;
    let (b, _) = node("b", b"").await?;
    let (c, _) = node("c", b"").await?;

    b.join(&[a.local_addr()]).await?;
    c.join(&[a.local_addr()]).await?;

    assert!(eventually(|| b.num_members() == 3 && c.num_members() == 3).await);

    for list in [a, b, c] {
        list.shutdown().await;
    }
    Ok(())
}

#[tokio::test]
async fn test_self_join_is_skipped() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;
    assert_eq!(a.join(&[a.local_addr()]).await?, 0);
    assert_eq!(a.num_members(), 1);
    assert!(a.knows_addr(&a.local_addr()));
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_join_unreachable_fails() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;

    // Bind then drop to get a port nobody listens on
    let unused = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    let result = a.join(&[unused]).await;
    assert!(matches!(result, Err(ClusterError::NoPeersJoined(1))));

    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_leave_is_observed() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;
    let (b, _) = node("b", b"").await?;
    b.join(&[a.local_addr()]).await?;
    assert!(eventually(|| a.num_members() == 2).await);

    b.leave(Duration::from_millis(500)).await;
    b.shutdown().await;

    assert!(eventually(|| a.num_members() == 1).await);
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_node_is_detected() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;
    let (b, _) = node("b", b"").await?;
    b.join(&[a.local_addr()]).await?;
    assert!(eventually(|| a.num_members() == 2).await);

    // No leave notice: a must notice through failed probes
    b.shutdown().await;
    assert!(eventually(|| a.num_members() == 1).await);

    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_dns_discovery_joins_peer() -> anyhow::Result<()> {
    let (a, _) = node("a", b"").await?;
    let (b, _) = node("b", b"").await?;

    let discovery = DnsDiscovery::new("localhost", a.local_addr().port(), Duration::from_millis(50));
    let joined = discovery.discover(&b).await;
    assert_eq!(joined, 1);
    assert_eq!(b.num_members(), 2);

    // Already known: nothing to do
    assert_eq!(discovery.discover(&b).await, 0);

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[test]
fn test_overhead_is_small() {
    assert!(BROADCAST_OVERHEAD < 64);
}
