//! Cluster membership configuration
//!
//! Intervals are stored in milliseconds so the struct round-trips through JSON/TOML;
//! the `*_interval()`/`*_timeout()` accessors return `Duration`s.
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default gossip port, shared by all nodes of a cluster.
pub const DEFAULT_PORT: u16 = 20001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Unique node name; a random UUID when unset
    #[serde(default)]
    pub node_name: Option<String>,

    #[serde(default = "ClusterConfig::default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Address peers should dial; the bound address when unset
    #[serde(default)]
    pub advertise_addr: Option<SocketAddr>,

    #[serde(default = "ClusterConfig::default_gossip_interval_ms")]
    pub gossip_interval_ms: u64,

    /// Peers contacted per gossip round
    #[serde(default = "ClusterConfig::default_gossip_nodes")]
    pub gossip_nodes: usize,

    #[serde(default = "ClusterConfig::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// How long a suspect may stay unreachable before it is declared dead
    #[serde(default = "ClusterConfig::default_suspicion_timeout_ms")]
    pub suspicion_timeout_ms: u64,

    /// How long dead/left members are remembered (and gossiped) before removal
    #[serde(default = "ClusterConfig::default_dead_node_reclaim_ms")]
    pub dead_node_reclaim_ms: u64,

    /// Full-state anti-entropy period
    #[serde(default = "ClusterConfig::default_push_pull_interval_ms")]
    pub push_pull_interval_ms: u64,

    /// Broadcast retransmissions scale with `retransmit_mult * ceil(log10(n + 1))`
    #[serde(default = "ClusterConfig::default_retransmit_mult")]
    pub retransmit_mult: usize,

    /// Piggybacked broadcast bytes per gossip message
    #[serde(default = "ClusterConfig::default_max_broadcast_bytes")]
    pub max_broadcast_bytes: usize,

    /// Queued broadcasts kept before the oldest are dropped
    #[serde(default = "ClusterConfig::default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Largest frame accepted on the gossip port (bounds full-state payloads)
    #[serde(default = "ClusterConfig::default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// DNS name resolving to every node of the cluster
    #[serde(default)]
    pub cluster_dns: Option<String>,

    /// Gossip port dialed on discovered addresses; the bind port when unset
    #[serde(default)]
    pub discovery_port: Option<u16>,

    #[serde(default = "ClusterConfig::default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
}

impl ClusterConfig {
    fn default_bind_addr() -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
    }

    const fn default_gossip_interval_ms() -> u64 {
        200
    }

    const fn default_gossip_nodes() -> usize {
        3
    }

    const fn default_probe_timeout_ms() -> u64 {
        500
    }

    const fn default_suspicion_timeout_ms() -> u64 {
        5_000
    }

    const fn default_dead_node_reclaim_ms() -> u64 {
        30_000
    }

    const fn default_push_pull_interval_ms() -> u64 {
        30_000
    }

    const fn default_retransmit_mult() -> usize {
        4
    }

    const fn default_max_broadcast_bytes() -> usize {
        64 * 1024
    }

    const fn default_max_queue_depth() -> usize {
        16 * 1024
    }

    const fn default_max_frame_bytes() -> usize {
        64 * 1024 * 1024
    }

    const fn default_discovery_interval_ms() -> u64 {
        10_000
    }

    /// Loopback settings with short intervals, for tests and local clusters.
    pub fn local() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            gossip_interval_ms: 50,
            probe_timeout_ms: 200,
            suspicion_timeout_ms: 500,
            dead_node_reclaim_ms: 2_000,
            push_pull_interval_ms: 500,
            discovery_interval_ms: 200,
            ..Self::default()
        }
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_advertise_addr(mut self, addr: SocketAddr) -> Self {
        self.advertise_addr = Some(addr);
        self
    }

    pub fn with_cluster_dns(mut self, name: impl Into<String>) -> Self {
        self.cluster_dns = Some(name.into());
        self
    }

    pub fn with_retransmit_mult(mut self, mult: usize) -> Self {
        self.retransmit_mult = mult;
        self
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn suspicion_timeout(&self) -> Duration {
        Duration::from_millis(self.suspicion_timeout_ms)
    }

    pub fn dead_node_reclaim(&self) -> Duration {
        Duration::from_millis(self.dead_node_reclaim_ms)
    }

    pub fn push_pull_interval(&self) -> Duration {
        Duration::from_millis(self.push_pull_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn discovery_port(&self) -> u16 {
        self.discovery_port.unwrap_or(self.bind_addr.port())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.gossip_interval_ms == 0 || self.push_pull_interval_ms == 0 {
            return Err("Gossip and push/pull intervals must be greater than zero".to_string());
        }
        if self.discovery_interval_ms == 0 {
            return Err("Discovery interval must be greater than zero".to_string());
        }
        if self.retransmit_mult == 0 {
            return Err("Retransmit multiplier must be greater than zero".to_string());
        }
        if self.max_broadcast_bytes == 0 || self.max_frame_bytes < self.max_broadcast_bytes {
            return Err("Frame limit must hold at least one broadcast payload".to_string());
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_name: None,
            bind_addr: Self::default_bind_addr(),
            advertise_addr: None,
            gossip_interval_ms: Self::default_gossip_interval_ms(),
            gossip_nodes: Self::default_gossip_nodes(),
            probe_timeout_ms: Self::default_probe_timeout_ms(),
            suspicion_timeout_ms: Self::default_suspicion_timeout_ms(),
            dead_node_reclaim_ms: Self::default_dead_node_reclaim_ms(),
            push_pull_interval_ms: Self::default_push_pull_interval_ms(),
            retransmit_mult: Self::default_retransmit_mult(),
            max_broadcast_bytes: Self::default_max_broadcast_bytes(),
            max_queue_depth: Self::default_max_queue_depth(),
            max_frame_bytes: Self::default_max_frame_bytes(),
            cluster_dns: None,
            discovery_port: None,
            discovery_interval_ms: Self::default_discovery_interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
        assert!(ClusterConfig::local().validate().is_ok());
        assert_eq!(ClusterConfig::default().discovery_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_rejects_zero_retransmit_mult() {
        let config = ClusterConfig::default().with_retransmit_mult(0);
        assert!(config.validate().is_err());
    }
}
