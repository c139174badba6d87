//! Listeners for the node's ports
//!
//! - `tcp` - accept loops for the write and read line protocols
//! - `http` - metrics endpoint (requires `http` feature)

pub mod tcp;

#[cfg(feature = "http")]
pub mod http;
