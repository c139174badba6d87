use clap::Parser;
use geodb::Config;
use geodb_cluster::ClusterConfig;
use geodb_server::{Node, NodeConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, env = "GEODB_WRITE_ADDR", default_value = "0.0.0.0:19999")]
    write_addr: SocketAddr,

    #[arg(long, env = "GEODB_READ_ADDR", default_value = "0.0.0.0:20000")]
    read_addr: SocketAddr,

    /// Serve `GET /metrics` here (requires the `http` feature)
    #[arg(long, env = "GEODB_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Index configuration file (TOML)
    #[arg(short, long, env = "GEODB_CONFIG")]
    config: Option<PathBuf>,

    /// Capacity of each subscriber's event buffer
    #[arg(long, env = "GEODB_SUBSCRIBER_BUFFER")]
    subscriber_buffer: Option<usize>,

    /// Run without cluster membership
    #[arg(long, env = "GEODB_STANDALONE")]
    standalone: bool,

    #[arg(long, env = "GEODB_NODE_NAME")]
    node_name: Option<String>,

    #[arg(long, env = "GEODB_CLUSTER_ADDR", default_value = "0.0.0.0:20001")]
    cluster_addr: SocketAddr,

    #[arg(long, env = "GEODB_ADVERTISE_ADDR")]
    advertise_addr: Option<SocketAddr>,

    /// DNS name resolving to the cluster's nodes
    #[arg(long, env = "GEODB_CLUSTER_DNS")]
    cluster_dns: Option<String>,

    /// Gossip addresses to join at startup
    #[arg(long, env = "GEODB_JOIN", value_delimiter = ',')]
    join: Vec<SocketAddr>,

    #[arg(long, env = "GEODB_GRACE_PERIOD_MS", default_value_t = 5000)]
    grace_period_ms: u64,
}

impl Args {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut index = match &self.config {
            Some(path) => {
                info!("Loading index configuration from {}", path.display());
                Config::from_toml(&std::fs::read_to_string(path)?)?
            }
            None => Config::default(),
        };
        if let Some(capacity) = self.subscriber_buffer {
            anyhow::ensure!(capacity > 0, "--subscriber-buffer must be greater than zero");
            index = index.with_subscriber_buffer(capacity);
        }

        let cluster = (!self.standalone).then(|| {
            let mut cluster = ClusterConfig::default().with_bind_addr(self.cluster_addr);
            if let Some(name) = &self.node_name {
                cluster = cluster.with_node_name(name.clone());
            }
            if let Some(addr) = self.advertise_addr {
                cluster = cluster.with_advertise_addr(addr);
            }
            if let Some(dns) = &self.cluster_dns {
                cluster = cluster.with_cluster_dns(dns.clone());
            }
            cluster
        });

        Ok(NodeConfig {
            write_addr: self.write_addr,
            read_addr: self.read_addr,
            metrics_addr: self.metrics_addr,
            grace_period: Duration::from_millis(self.grace_period_ms),
            index,
            cluster,
            seeds: self.join.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "geodb_server=info,geodb_cluster=info,geodb=info,info".into()
            }),
        )
        .init();

    let args = Args::parse();
    let node = Node::start(args.node_config()?).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    node.shutdown().await;

    Ok(())
}
