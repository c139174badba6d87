//! GeoDB Client
//!
//! Native async client for a GeoDB node's line protocols.
//!
//! # Example
//!
//! ```ignore
//! use geodb_client::{SubscribeClient, WriteClient};
//!
//! let mut writer = WriteClient::connect(write_addr).await?;
//! writer.save("ac1", 37.7749, -122.4194).await?;
//!
//! let mut events = SubscribeClient::connect(read_addr).await?;
//! events.subscribe("9q8y").await?;
//! let event = events.next_event().await?;
//! ```

pub mod transport;

pub use geodb_server::protocol::WireEvent;
pub use transport::tcp::{ClientError, Result, SubscribeClient, WriteClient};
