//! Node bootstrap: index, replication, listeners and orderly shutdown.

use geodb::{Config, SpatialIndex};
use geodb_cluster::{ClusterConfig, ClusterSize, DnsDiscovery, Memberlist};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::error::{Result, ServerError};
use crate::reader::ReadHandler;
use crate::replication::ReplicationDelegate;
use crate::transport::tcp::{Shutdown, run_server};
use crate::writer::WriteHandler;

pub const DEFAULT_WRITE_PORT: u16 = 19999;
pub const DEFAULT_READ_PORT: u16 = 20000;

/// How long peers get to hear our leave notice.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub write_addr: SocketAddr,
    pub read_addr: SocketAddr,
    /// `GET /metrics` listener; needs the `http` feature
    pub metrics_addr: Option<SocketAddr>,
    /// Time in-flight connections get to finish after listeners stop
    pub grace_period: Duration,
    pub index: Config,
    /// Cluster membership; `None` runs a standalone node
    pub cluster: Option<ClusterConfig>,
    /// Gossip addresses to join at startup
    pub seeds: Vec<SocketAddr>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            write_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WRITE_PORT)),
            read_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_READ_PORT)),
            metrics_addr: None,
            grace_period: Duration::from_secs(5),
            index: Config::default(),
            cluster: None,
            seeds: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Loopback listeners on ephemeral ports, standalone.
    pub fn local() -> Self {
        Self {
            write_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            read_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            grace_period: Duration::from_millis(200),
            ..Self::default()
        }
    }

    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }
}

pub struct Node {
    index: Arc<SpatialIndex>,
    replication: Option<Arc<ReplicationDelegate>>,
    memberlist: Option<Arc<Memberlist>>,
    discovery: Option<JoinHandle<()>>,
    write_addr: SocketAddr,
    read_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    grace_period: Duration,
    shutdown: Shutdown,
    tasks: TaskTracker,
}

impl Node {
    /// Bind every listener, then join the cluster if configured and start serving.
    ///
    /// Failing to bind a port is fatal and happens before any peer hears of this
    /// node; failing to join seeds is not fatal.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let index = Arc::new(SpatialIndex::builder().config(config.index).build()?);

        let write_listener = bind(config.write_addr).await?;
        let read_listener = bind(config.read_addr).await?;
        let write_addr = local_addr(&write_listener, config.write_addr)?;
        let read_addr = local_addr(&read_listener, config.read_addr)?;
        let metrics_listener = match config.metrics_addr {
            Some(addr) => bind_metrics(addr).await?,
            None => None,
        };

        let (replication, memberlist, discovery) = match config.cluster {
            Some(cluster) => {
                let size = ClusterSize::new();
                let replication = Arc::new(ReplicationDelegate::from_config(
                    Arc::clone(&index),
                    &cluster,
                    size.clone(),
                ));
                let discovery = DnsDiscovery::from_config(&cluster);
                let memberlist = Memberlist::create(cluster, replication.clone(), size).await?;

                if !config.seeds.is_empty() {
                    match memberlist.join(&config.seeds).await {
                        Ok(joined) => info!("Joined cluster through {} seeds", joined),
                        Err(e) => warn!("Failed to join seeds, starting alone: {}", e),
                    }
                }
                let discovery = discovery.map(|d| {
                    info!("Discovering peers via {}", d.dns_name());
                    d.spawn(Arc::clone(&memberlist))
                });

                (Some(replication), Some(memberlist), discovery)
            }
            None => (None, None, None),
        };

        let shutdown = Shutdown::new();
        let tasks = TaskTracker::new();

        let writer = WriteHandler::new(Arc::clone(&index), replication.clone());
        tasks.spawn(run_server(
            "write",
            write_listener,
            move |socket, peer| {
                let writer = writer.clone();
                async move { writer.handle(socket, peer).await }
            },
            shutdown.clone(),
            tasks.clone(),
        ));

        let reader = ReadHandler::new(Arc::clone(&index));
        tasks.spawn(run_server(
            "read",
            read_listener,
            move |socket, peer| {
                let reader = reader.clone();
                async move { reader.handle(socket, peer).await }
            },
            shutdown.clone(),
            tasks.clone(),
        ));

        let metrics_addr = match metrics_listener {
            Some((listener, addr)) => {
                serve_metrics(listener, &index, &shutdown, &tasks);
                Some(addr)
            }
            None => None,
        };

        info!(
            "GeoDB node started: write {}, read {}{}",
            write_addr,
            read_addr,
            if memberlist.is_some() { ", clustered" } else { "" }
        );

        Ok(Self {
            index,
            replication,
            memberlist,
            discovery,
            write_addr,
            read_addr,
            metrics_addr,
            grace_period: config.grace_period,
            shutdown,
            tasks,
        })
    }

    pub fn index(&self) -> &Arc<SpatialIndex> {
        &self.index
    }

    pub fn replication(&self) -> Option<&Arc<ReplicationDelegate>> {
        self.replication.as_ref()
    }

    pub fn memberlist(&self) -> Option<&Arc<Memberlist>> {
        self.memberlist.as_ref()
    }

    pub fn write_addr(&self) -> SocketAddr {
        self.write_addr
    }

    pub fn read_addr(&self) -> SocketAddr {
        self.read_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Stop accepting, give open connections the grace period, then leave the
    /// cluster.
    pub async fn shutdown(self) {
        info!("Shutting down GeoDB node");
        self.shutdown.stop_accepting();
        self.tasks.close();

        if tokio::time::timeout(self.grace_period, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                "Connections still open after {:?}, closing them",
                self.grace_period
            );
            self.shutdown.close_connections();
            self.tasks.wait().await;
        }

        if let Some(memberlist) = &self.memberlist {
            memberlist.leave(LEAVE_TIMEOUT).await;
            memberlist.shutdown().await;
        }
        if let Some(discovery) = self.discovery {
            let _ = discovery.await;
        }
        info!("GeoDB node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("write_addr", &self.write_addr)
            .field("read_addr", &self.read_addr)
            .field("metrics_addr", &self.metrics_addr)
            .field("clustered", &self.memberlist.is_some())
            .finish()
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: SocketAddr) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })
}

#[cfg(feature = "http")]
async fn bind_metrics(addr: SocketAddr) -> Result<Option<(TcpListener, SocketAddr)>> {
    let listener = bind(addr).await?;
    let bound = local_addr(&listener, addr)?;
    Ok(Some((listener, bound)))
}

#[cfg(not(feature = "http"))]
async fn bind_metrics(addr: SocketAddr) -> Result<Option<(TcpListener, SocketAddr)>> {
    warn!(
        "Metrics address {} ignored: built without the `http` feature",
        addr
    );
    Ok(None)
}

#[cfg(feature = "http")]
fn serve_metrics(
    listener: TcpListener,
    index: &Arc<SpatialIndex>,
    shutdown: &Shutdown,
    tasks: &TaskTracker,
) {
    let index = Arc::clone(index);
    let stop = shutdown.accept_token();
    tasks.spawn(async move {
        if let Err(e) = crate::transport::http::run_server(listener, index, stop).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });
}

#[cfg(not(feature = "http"))]
fn serve_metrics(
    _listener: TcpListener,
    _index: &Arc<SpatialIndex>,
    _shutdown: &Shutdown,
    _tasks: &TaskTracker,
) {
}
