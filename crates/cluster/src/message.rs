//! Gossip wire messages.
//!
//! Every exchange is one request frame and at most one response frame over a
//! short-lived TCP connection. Frames are length-delimited, bodies are bincode.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{ClusterError, Result};
use crate::member::NodeState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Liveness probe carrying our view of the members and pending broadcasts.
    Ping {
        seq: u64,
        from: NodeState,
        members: Vec<NodeState>,
        broadcasts: Vec<Vec<u8>>,
    },
    Ack {
        seq: u64,
        from: NodeState,
        broadcasts: Vec<Vec<u8>>,
    },
    /// Full state exchange; answered with another `PushPull`.
    PushPull {
        join: bool,
        from: NodeState,
        members: Vec<NodeState>,
        state: Vec<u8>,
    },
    Leave { from: NodeState },
}

/// Bytes of framing a single piggybacked broadcast costs.
pub const BROADCAST_OVERHEAD: usize = 8;

pub type Connection = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed(stream: TcpStream, max_frame_bytes: usize) -> Connection {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_bytes)
        .new_codec();
    Framed::new(stream, codec)
}

pub async fn send(conn: &mut Connection, msg: &Message) -> Result<()> {
    let buf = bincode::serialize(msg)?;
    conn.send(Bytes::from(buf)).await?;
    Ok(())
}

/// Next message, or `Closed` if the peer hung up.
pub async fn recv(conn: &mut Connection, peer: SocketAddr) -> Result<Message> {
    match conn.next().await {
        Some(frame) => Ok(bincode::deserialize(&frame?)?),
        None => Err(ClusterError::Closed(peer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberStatus;
    use tokio::net::TcpListener;

    fn node() -> NodeState {
        NodeState {
            name: "n1".into(),
            addr: SocketAddr::from(([127, 0, 0, 1], 20001)),
            incarnation: 2,
            status: MemberStatus::Alive,
            meta: vec![1, 2],
        }
    }

    #[tokio::test]
    async fn test_exchange_over_tcp() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await?;
            let mut conn = framed(stream, 1024);
            let msg = recv(&mut conn, peer).await?;
            if let Message::Ping { seq, from, .. } = msg {
                send(&mut conn, &Message::Ack { seq, from, broadcasts: vec![b"x".to_vec()] }).await?;
            }
            Ok::<_, ClusterError>(())
        });

        let mut conn = framed(TcpStream::connect(addr).await?, 1024);
        let ping = Message::Ping {
            seq: 7,
            from: node(),
            members: vec![node()],
            broadcasts: Vec::new(),
        };
        send(&mut conn, &ping).await?;
        let reply = recv(&mut conn, addr).await?;
        assert_eq!(
            reply,
            Message::Ack {
                seq: 7,
                from: node(),
                broadcasts: vec![b"x".to_vec()]
            }
        );
        server.await??;

        // Server hung up after one exchange
        assert!(matches!(recv(&mut conn, addr).await, Err(ClusterError::Closed(_))));
        Ok(())
    }
}
