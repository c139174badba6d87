use geodb::GeoDbError;
use geodb_cluster::ClusterError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while starting or running a node.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Index(#[from] GeoDbError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("serve error: {0}")]
    Serve(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
