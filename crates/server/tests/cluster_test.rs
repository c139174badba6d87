use geodb::cell_of;
use geodb_client::{SubscribeClient, WireEvent, WriteClient};
use geodb_cluster::ClusterConfig;
use geodb_server::{Node, NodeConfig, ServerError};
use std::time::Duration;

async fn start(name: &str, seeds: Vec<std::net::SocketAddr>) -> anyhow::Result<Node> {
    let config = NodeConfig::local()
        .with_cluster(ClusterConfig::local().with_node_name(name))
        .with_seeds(seeds);
    Ok(Node::start(config).await?)
}

fn gossip_addr(node: &Node) -> std::net::SocketAddr {
    node.memberlist()
        .map(|m| m.local_addr())
        .expect("clustered node")
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_join_pulls_existing_state() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let a = start("a", Vec::new()).await?;
    a.index().save("ac1", 37.7749, -122.4194)?;
    a.index().save("ac2", 40.7128, -74.0060)?;

    let b = start("b", vec![gossip_addr(&a)]).await?;
    assert_eq!(b.index().len(), 2);
    assert_eq!(b.index().get("ac2"), a.index().get("ac2"));

    b.shutdown().await;
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_write_replicates_to_peer_subscriber() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let a = start("a", Vec::new()).await?;
    let b = start("b", vec![gossip_addr(&a)]).await?;
    assert!(eventually(|| a.memberlist().is_some_and(|m| m.num_members() == 2)).await);

    let cell = cell_of(37.7749, -122.4194);
    let mut reader = SubscribeClient::connect(b.read_addr()).await?;
    reader.subscribe(&cell).await?;
    assert!(
        eventually(|| b
            .index()
            .cell(&cell)
            .is_some_and(|c| c.subscriber_count() == 1))
        .await
    );

    let mut writer = WriteClient::connect(a.write_addr()).await?;
    writer.save("ac1", 37.7749, -122.4194).await?;

    let event = reader
        .next_event_timeout(Duration::from_secs(5))
        .await?
        .expect("replicated event");
    assert_eq!(
        event,
        WireEvent::Added {
            loc_id: "ac1".into(),
            lat: 37.7749,
            lon: -122.4194
        }
    );

    // Retransmits and anti-entropy rounds must not echo the write again
    let extra = reader.next_event_timeout(Duration::from_secs(1)).await?;
    assert_eq!(extra, None);
    assert_eq!(b.index().operations_count(), 1);

    // Replicated deltas are never queued again
    assert_eq!(b.replication().map(|r| r.queued()), Some(0));

    b.shutdown().await;
    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_peer_sees_clean_leave() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let a = start("a", Vec::new()).await?;
    let b = start("b", vec![gossip_addr(&a)]).await?;
    assert!(eventually(|| a.memberlist().is_some_and(|m| m.num_members() == 2)).await);

    b.shutdown().await;
    assert!(eventually(|| a.memberlist().is_some_and(|m| m.num_members() == 1)).await);

    a.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_never_reaches_cluster() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let a = start("a", Vec::new()).await?;

    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let mut config = NodeConfig::local()
        .with_cluster(ClusterConfig::local().with_node_name("b"))
        .with_seeds(vec![gossip_addr(&a)]);
    config.read_addr = taken.local_addr()?;

    let err = Node::start(config).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(a.memberlist().map(|m| m.num_members()), Some(1));

    a.shutdown().await;
    Ok(())
}
