//! Error taxonomy shared by the index, the protocol handlers and the ingestion boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoDbError {
    /// Empty location identity.
    #[error("location id is required")]
    InvalidIdentity,

    /// Out-of-range or non-finite coordinates. Only raised by the ingestion boundary.
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    /// Cell identifier that is not a geohash of the configured resolution.
    #[error("invalid cell id: {0}")]
    InvalidCell(String),

    /// Malformed line on the write or read port.
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Gossip send/receive or replication payload failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Socket accept/read/write failure.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for GeoDbError {
    fn from(e: serde_json::Error) -> Self {
        GeoDbError::ProtocolDecode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeoDbError>;
