//! TCP accept loop shared by the write and read ports.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Two-stage shutdown: stop accepting first, force-close connections later.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    accept: CancellationToken,
    connections: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_accepting(&self) {
        self.accept.cancel();
    }

    pub fn close_connections(&self) {
        self.accept.cancel();
        self.connections.cancel();
    }

    /// Cancelled once listeners should stop.
    pub fn accept_token(&self) -> CancellationToken {
        self.accept.clone()
    }

    pub fn is_accepting(&self) -> bool {
        !self.accept.is_cancelled()
    }
}

/// Accept connections on `listener` and run `handler` on each in its own task,
/// tracked by `tasks`, until `shutdown` stops accepting.
pub async fn run_server<F, Fut>(
    name: &'static str,
    listener: TcpListener,
    handler: F,
    shutdown: Shutdown,
    tasks: TaskTracker,
) where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = geodb::Result<()>> + Send + 'static,
{
    match listener.local_addr() {
        Ok(addr) => info!("GeoDB {} port listening on {}", name, addr),
        Err(e) => error!("GeoDB {} listener has no local address: {}", name, e),
    }

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, peer)) => {
                        if let Err(e) = socket.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        debug!("New {} connection from {}", name, peer);

                        let session = handler(socket, peer);
                        let close = shutdown.connections.clone();
                        tasks.spawn(async move {
                            tokio::select! {
                                result = session => {
                                    if let Err(e) = result {
                                        debug!("{} connection from {} ended: {}", name, peer, e);
                                    }
                                }
                                _ = close.cancelled() => {
                                    debug!("Closing {} connection from {}", name, peer);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on {} port: {}", name, e);
                    }
                }
            }
            _ = shutdown.accept.cancelled() => {
                info!("Shutdown signal received, stopping {} listener...", name);
                break;
            }
        }
    }
}
