//! Transport layer for the GeoDB client
//!
//! - `tcp` - newline-delimited JSON over TCP, one connection per port

pub mod tcp;
