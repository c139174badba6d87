use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Timed out talking to {0}")]
    Timeout(std::net::SocketAddr),
    #[error("Peer {0} closed the connection")]
    Closed(std::net::SocketAddr),
    #[error("Unexpected message from {0}")]
    UnexpectedMessage(std::net::SocketAddr),
    #[error("Failed to join any of {0} candidate peers")]
    NoPeersJoined(usize),
    #[error("Invalid cluster configuration: {0}")]
    InvalidConfig(String),
    #[error("Memberlist is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, ClusterError>;
