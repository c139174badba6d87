//! DNS-based peer discovery.
//!
//! Every interval the configured name is resolved and any address not yet in the
//! member table is joined. Resolution and join failures are logged and retried
//! on the next tick; they never stop the node.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::memberlist::Memberlist;

#[derive(Debug, Clone)]
pub struct DnsDiscovery {
    dns_name: String,
    port: u16,
    interval: Duration,
}

impl DnsDiscovery {
    pub fn new(dns_name: impl Into<String>, port: u16, interval: Duration) -> Self {
        Self {
            dns_name: dns_name.into(),
            port,
            interval,
        }
    }

    /// Discovery settings from `config`, if a DNS name is configured.
    pub fn from_config(config: &ClusterConfig) -> Option<Self> {
        config.cluster_dns.as_ref().map(|name| {
            Self::new(name.clone(), config.discovery_port(), config.discovery_interval())
        })
    }

    pub fn dns_name(&self) -> &str {
        &self.dns_name
    }

    /// Resolve the name to a sorted, deduplicated set of gossip addresses.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: BTreeSet<SocketAddr> = tokio::net::lookup_host((self.dns_name.as_str(), self.port))
            .await?
            .collect();
        Ok(addrs.into_iter().collect())
    }

    /// Resolve once and join every address the memberlist does not know yet.
    pub async fn discover(&self, list: &Memberlist) -> usize {
        let addrs = match self.resolve().await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("Failed to resolve {}: {}", self.dns_name, e);
                return 0;
            }
        };

        let unknown: Vec<SocketAddr> = addrs.into_iter().filter(|a| !list.knows_addr(a)).collect();
        if unknown.is_empty() {
            return 0;
        }

        debug!("Discovered {} new addresses via {}", unknown.len(), self.dns_name);
        match list.join(&unknown).await {
            Ok(joined) => {
                if joined > 0 {
                    info!("Joined {} peers via {}", joined, self.dns_name);
                }
                joined
            }
            Err(e) => {
                warn!("Failed to join peers from {}: {}", self.dns_name, e);
                0
            }
        }
    }

    /// Run discovery until the memberlist shuts down.
    pub fn spawn(self, list: Arc<Memberlist>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let shutdown = list.shutdown_token();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.discover(&list).await;
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}
