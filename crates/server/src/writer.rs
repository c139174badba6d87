//! Write port handler.
//!
//! One command per line. A blank line or EOF ends the session. Bad lines get a
//! single error line back and the session carries on. Successful saves are handed
//! to replication; rejected ones are not.

use futures::{SinkExt, StreamExt};
use geodb::SpatialIndex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::protocol::{self, ERR_PARSE, ERR_SAVE, WriteCommand};
use crate::replication::ReplicationDelegate;

#[derive(Clone)]
pub struct WriteHandler {
    index: Arc<SpatialIndex>,
    replication: Option<Arc<ReplicationDelegate>>,
}

impl WriteHandler {
    pub fn new(index: Arc<SpatialIndex>, replication: Option<Arc<ReplicationDelegate>>) -> Self {
        Self { index, replication }
    }

    /// Save one command and queue it for peers.
    pub fn apply(&self, cmd: &WriteCommand) -> geodb::Result<()> {
        self.index.save(&cmd.loc_id, cmd.lat, cmd.lon)?;
        if let Some(replication) = &self.replication {
            replication.broadcast(&cmd.loc_id, cmd.lat, cmd.lon);
        }
        Ok(())
    }

    /// Serve one write connection until blank line, EOF or socket error.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr) -> geodb::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = LinesCodec::new_with_max_length(self.index.config().max_line_length);
        let mut lines = Framed::new(stream, codec);
        let mut applied = 0u64;

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Line from {} exceeds the maximum length", peer);
                    Self::reply_error(&mut lines, ERR_PARSE).await?;
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };

            if line.trim().is_empty() {
                break;
            }

            let cmd = match protocol::decode_write(&line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Error parsing command from {}: {} ({:?})", peer, e, line);
                    Self::reply_error(&mut lines, ERR_PARSE).await?;
                    continue;
                }
            };

            match self.apply(&cmd) {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!("Error saving {:?} from {}: {}", cmd.loc_id, peer, e);
                    Self::reply_error(&mut lines, ERR_SAVE).await?;
                }
            }
        }

        debug!("Write session from {} closed after {} commands", peer, applied);
        Ok(())
    }

    async fn reply_error<S>(lines: &mut Framed<S, LinesCodec>, msg: &str) -> geodb::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match lines.send(msg).await {
            Ok(()) => Ok(()),
            Err(LinesCodecError::Io(e)) => Err(e.into()),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodb::{SubscriberId, cell_of};
    use geodb_cluster::ClusterSize;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[test]
    fn test_rejected_save_is_not_broadcast() {
        let index = Arc::new(SpatialIndex::new());
        let replication = Arc::new(ReplicationDelegate::new(
            index.clone(),
            4,
            1024,
            ClusterSize::new(),
        ));
        let handler = WriteHandler::new(index.clone(), Some(replication.clone()));

        assert!(handler.apply(&WriteCommand::new("", 1.0, 1.0)).is_err());
        assert_eq!(replication.queued(), 0);

        handler.apply(&WriteCommand::new("ac1", 1.0, 1.0)).unwrap();
        assert_eq!(replication.queued(), 1);
    }

    #[tokio::test]
    async fn test_bad_line_answered_inline() {
        let index = Arc::new(SpatialIndex::new());
        let handler = WriteHandler::new(index.clone(), None);

        let stream = tokio_test::io::Builder::new()
            .read(b"garbage\n")
            .write(b"Error parsing command\n")
            .read(b"{\"loc_id\":\"ac1\",\"lat\":1.0,\"lon\":2.0}\n")
            .build();

        handler.handle(stream, peer()).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_session_over_duplex() {
        let index = Arc::new(SpatialIndex::new());
        let handler = WriteHandler::new(index.clone(), None);

        let (sink, mut rx) = index.new_sink();
        index
            .subscribe(&cell_of(37.7749, -122.4194), SubscriberId::new(), sink)
            .unwrap();

        let (client, server) = tokio::io::duplex(4096);
        let session = tokio::spawn(async move { handler.handle(server, peer()).await });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut replies = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"loc_id\":\"ac1\",\"lat\":37.7749,\"lon\":-122.4194}\n")
            .await
            .unwrap();
        write_half.write_all(b"garbage\n").await.unwrap();
        assert_eq!(replies.next_line().await.unwrap().unwrap(), ERR_PARSE);

        write_half
            .write_all(b"{\"loc_id\":\"\",\"lat\":1,\"lon\":1}\n")
            .await
            .unwrap();
        assert_eq!(replies.next_line().await.unwrap().unwrap(), ERR_SAVE);

        // Still open after errors
        write_half
            .write_all(b"{\"loc_id\":\"ac1\",\"lat\":37.775,\"lon\":-122.4195}\n\n")
            .await
            .unwrap();

        session.await.unwrap().unwrap();
        assert_eq!(index.get("ac1").unwrap().position(), (37.775, -122.4195));

        assert!(rx.try_recv().unwrap().is_added());
        assert!(rx.try_recv().unwrap().is_updated());
        assert!(rx.try_recv().is_err());
    }
}
