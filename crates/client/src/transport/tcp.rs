//! Line-protocol clients for the write and read ports.

use futures::{SinkExt, StreamExt};
use geodb_server::protocol::{self, SubscribeCommand, WireEvent, WriteCommand};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Connection closed by server")]
    Closed,
}

impl From<LinesCodecError> for ClientError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(e) => ClientError::Connection(e),
            LinesCodecError::MaxLineLengthExceeded => ClientError::Server(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

type Lines = Framed<TcpStream, LinesCodec>;

async fn connect(addr: SocketAddr) -> Result<Lines> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, LinesCodec::new()))
}

/// Client for the write port. The server only answers on errors.
pub struct WriteClient {
    lines: Lines,
}

impl WriteClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            lines: connect(addr).await?,
        })
    }

    pub async fn save(&mut self, id: &str, latitude: f64, longitude: f64) -> Result<()> {
        self.send(&WriteCommand::new(id, latitude, longitude)).await
    }

    pub async fn send(&mut self, cmd: &WriteCommand) -> Result<()> {
        let line = protocol::encode_line(cmd)?;
        self.lines.send(line).await?;
        Ok(())
    }

    /// Send a raw line as-is.
    pub async fn send_raw(&mut self, line: &str) -> Result<()> {
        self.lines.send(line).await?;
        Ok(())
    }

    /// An error line sent by the server within `wait`, if any.
    pub async fn next_error(&mut self, wait: Duration) -> Result<Option<String>> {
        match tokio::time::timeout(wait, self.lines.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(ClientError::Closed),
            Ok(Some(line)) => Ok(Some(line?)),
        }
    }

    /// End the session with a blank line.
    pub async fn close(mut self) -> Result<()> {
        self.lines.send("").await?;
        Ok(())
    }
}

/// Client for the read port.
pub struct SubscribeClient {
    lines: Lines,
}

impl SubscribeClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            lines: connect(addr).await?,
        })
    }

    /// Start receiving events for `grid_name`. Subscriptions accumulate.
    pub async fn subscribe(&mut self, grid_name: &str) -> Result<()> {
        let line = protocol::encode_line(&SubscribeCommand::new(grid_name))?;
        self.lines.send(line).await?;
        Ok(())
    }

    /// Next event from any subscribed cell.
    ///
    /// A line that is not an event is the server's error report; the server closes
    /// the connection after it.
    pub async fn next_event(&mut self) -> Result<WireEvent> {
        let line = self.lines.next().await.ok_or(ClientError::Closed)??;
        serde_json::from_str(&line).map_err(|_| ClientError::Server(line))
    }

    /// Like [`next_event`](Self::next_event), giving up after `wait`.
    pub async fn next_event_timeout(&mut self, wait: Duration) -> Result<Option<WireEvent>> {
        match tokio::time::timeout(wait, self.next_event()).await {
            Ok(event) => event.map(Some),
            Err(_) => Ok(None),
        }
    }
}
