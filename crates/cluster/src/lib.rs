//! GeoDB cluster membership
//!
//! Gossip-based membership with failure detection, piggybacked best-effort
//! broadcasts and periodic full-state push/pull, in the style of memberlist.
//!
//! # Example
//!
//! ```ignore
//! use geodb_cluster::{ClusterConfig, ClusterSize, Memberlist};
//!
//! let size = ClusterSize::new();
//! let list = Memberlist::create(ClusterConfig::default(), delegate, size).await?;
//! list.join(&seeds).await?;
//! ```

pub mod broadcast;
pub mod config;
pub mod delegate;
pub mod discovery;
pub mod error;
pub mod member;
pub mod memberlist;
pub mod message;

pub use broadcast::{ClusterSize, TransmitLimitedQueue, retransmit_limit};
pub use config::{ClusterConfig, DEFAULT_PORT};
pub use delegate::Delegate;
pub use discovery::DnsDiscovery;
pub use error::{ClusterError, Result};
pub use member::{MemberStatus, NodeState};
pub use memberlist::Memberlist;
pub use message::BROADCAST_OVERHEAD;
