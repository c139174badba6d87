//! GeoDB Server
//!
//! A GeoDB node: the write and read line protocols over a shared
//! [`SpatialIndex`](geodb::SpatialIndex), replicated to peers over gossip.
//!
//! # Ports
//!
//! - **write** (19999): `{"loc_id","lat","lon"}` per line
//! - **read** (20000): `{"gridName"}` per line, change events streamed back
//! - **metrics** (optional): `GET /metrics`, enable with `http` feature
//!
//! # Example
//!
//! ```ignore
//! use geodb_server::{Node, NodeConfig};
//!
//! let node = Node::start(NodeConfig::default()).await?;
//! tokio::signal::ctrl_c().await?;
//! node.shutdown().await;
//! ```

pub mod error;
pub mod metrics;
pub mod node;
pub mod protocol;
pub mod reader;
pub mod replication;
pub mod transport;
pub mod writer;

pub use error::{Result, ServerError};
pub use node::{Node, NodeConfig};
pub use protocol::{SubscribeCommand, WireEvent, WriteCommand};
pub use reader::ReadHandler;
pub use replication::ReplicationDelegate;
pub use writer::WriteHandler;
