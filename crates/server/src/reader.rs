//! Read port handler.
//!
//! Each connection is one subscriber session with a single bounded sink. Every
//! `{"gridName": ...}` line attaches that sink to another cell; events from all of
//! them are streamed back as JSON lines while further commands are read. The
//! first bad line gets an error line and ends the session. On exit the session is
//! unsubscribed from every cell it joined.

use futures::{SinkExt, StreamExt};
use geodb::{GeoDbError, SpatialIndex, SubscriberId};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::protocol::{self, ERR_GRID_NOT_FOUND, ERR_PARSE, WireEvent};

#[derive(Clone)]
pub struct ReadHandler {
    index: Arc<SpatialIndex>,
}

impl ReadHandler {
    pub fn new(index: Arc<SpatialIndex>) -> Self {
        Self { index }
    }

    pub async fn handle<S>(&self, stream: S, peer: SocketAddr) -> geodb::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let subscriber = SubscriberId::new();
        let (sink, events) = self.index.new_sink();
        let mut events = ReceiverStream::new(events);

        let (read_half, write_half) = tokio::io::split(stream);
        let mut commands = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(self.index.config().max_line_length),
        );
        let mut out = FramedWrite::new(write_half, LinesCodec::new());

        debug!("Read session {} opened from {}", subscriber, peer);
        let mut cells = BTreeSet::new();

        let result = loop {
            tokio::select! {
                line = commands.next() => {
                    let line = match line {
                        None => break Ok(()),
                        Some(Ok(line)) => line,
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!("Line from {} exceeds the maximum length", peer);
                            let _ = out.send(ERR_PARSE).await;
                            break Err(GeoDbError::ProtocolDecode("line too long".to_string()));
                        }
                        Some(Err(LinesCodecError::Io(e))) => break Err(e.into()),
                    };

                    if line.trim().is_empty() {
                        break Ok(());
                    }

                    let cmd = match protocol::decode_subscribe(&line) {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            warn!("Error parsing command from {}: {} ({:?})", peer, e, line);
                            let _ = out.send(ERR_PARSE).await;
                            break Err(e);
                        }
                    };

                    if let Err(e) = self.index.subscribe(&cmd.grid_name, subscriber, sink.clone()) {
                        warn!("Grid not found for {}: {:?}", peer, cmd.grid_name);
                        let _ = out.send(ERR_GRID_NOT_FOUND).await;
                        break Err(e);
                    }
                    debug!("Session {} subscribed to {}", subscriber, cmd.grid_name);
                    cells.insert(cmd.grid_name);
                }
                Some(event) = events.next() => {
                    let line = match protocol::encode_line(&WireEvent::from(&event)) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("Error encoding event for {}: {}", event.record_id, e);
                            continue;
                        }
                    };
                    if let Err(e) = out.send(line).await {
                        break Err(match e {
                            LinesCodecError::Io(e) => e.into(),
                            other => GeoDbError::ProtocolDecode(other.to_string()),
                        });
                    }
                }
            }
        };

        for cell in &cells {
            self.index.unsubscribe(cell, &subscriber);
        }
        debug!(
            "Read session {} from {} closed, left {} cells",
            subscriber,
            peer,
            cells.len()
        );
        result
    }
}
