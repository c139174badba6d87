//! Gossip membership runtime.
//!
//! A [`Memberlist`] owns a TCP listener and three background tasks:
//! - accept: answers pings, push/pull exchanges and leave notices
//! - gossip: pings a few random peers every `gossip_interval`, piggybacking
//!   pending broadcasts, and promotes expired suspects to dead
//! - push/pull: exchanges full state with one random peer every `push_pull_interval`
//!
//! Delivery is best effort. Nothing here retries beyond the next tick.

use futures::future::join_all;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::ClusterSize;
use crate::config::ClusterConfig;
use crate::delegate::Delegate;
use crate::error::{ClusterError, Result};
use crate::member::{MemberChange, MemberStatus, Members, NodeState};
use crate::message::{self, BROADCAST_OVERHEAD, Connection, Message};

/// Largest metadata blob a delegate may attach to the local node.
pub const META_MAX_SIZE: usize = 512;

/// Push/pull carries full state; it gets this many probe timeouts to complete.
const PUSH_PULL_TIMEOUT_FACTOR: u32 = 10;

pub struct Memberlist {
    config: ClusterConfig,
    delegate: Arc<dyn Delegate>,
    members: Members,
    local_addr: SocketAddr,
    self_addrs: RwLock<HashSet<SocketAddr>>,
    seq: AtomicU64,
    left: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Memberlist {
    /// Bind the gossip listener and start the background tasks.
    pub async fn create(
        config: ClusterConfig,
        delegate: Arc<dyn Delegate>,
        cluster_size: ClusterSize,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(ClusterError::InvalidConfig)?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let advertise = config.advertise_addr.unwrap_or(local_addr);

        let name = config
            .node_name
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut meta = delegate.node_meta(META_MAX_SIZE);
        meta.truncate(META_MAX_SIZE);

        let local = NodeState {
            name,
            addr: advertise,
            incarnation: 0,
            status: MemberStatus::Alive,
            meta,
        };

        let mut self_addrs = HashSet::new();
        self_addrs.insert(local_addr);
        self_addrs.insert(advertise);

        let list = Arc::new(Self {
            config,
            delegate,
            members: Members::new(local, cluster_size),
            local_addr,
            self_addrs: RwLock::new(self_addrs),
            seq: AtomicU64::new(0),
            left: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        info!(
            "Memberlist {} listening on {} (advertising {})",
            list.members.local_name(),
            local_addr,
            advertise
        );

        list.tasks.spawn(Arc::clone(&list).accept_loop(listener));
        list.tasks.spawn(Arc::clone(&list).gossip_loop());
        list.tasks.spawn(Arc::clone(&list).push_pull_loop());

        Ok(list)
    }

    /// Join the cluster through any of `seeds` with a full state exchange.
    ///
    /// Addresses that turn out to be this node are remembered and skipped. Returns
    /// the number of peers contacted successfully; an error only if every
    /// non-self seed failed.
    pub async fn join(&self, seeds: &[SocketAddr]) -> Result<usize> {
        if self.shutdown.is_cancelled() {
            return Err(ClusterError::Shutdown);
        }

        let mut joined = 0;
        let mut attempted = 0;
        for addr in seeds {
            if self.is_self_addr(addr) {
                continue;
            }
            attempted += 1;

            match self.push_pull(*addr, true).await {
                Ok(Some(node)) => {
                    debug!("Joined {} through {}", node.name, addr);
                    joined += 1;
                }
                Ok(None) => {
                    debug!("Seed {} is this node", addr);
                    self.self_addrs.write().insert(*addr);
                    attempted -= 1;
                }
                Err(e) => warn!("Failed to join {}: {}", addr, e),
            }
        }

        if joined == 0 && attempted > 0 {
            return Err(ClusterError::NoPeersJoined(attempted));
        }
        Ok(joined)
    }

    /// Tell live peers we are leaving. Idempotent.
    pub async fn leave(&self, wait: Duration) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }

        let me = self.members.set_local_left();
        let peers = self.members.live_peers();
        info!("Leaving cluster, notifying {} peers", peers.len());

        let notices = peers.iter().map(|peer| {
            let msg = Message::Leave { from: me.clone() };
            async move {
                if let Err(e) = self.send_oneway(peer.addr, &msg, wait).await {
                    debug!("Leave notice to {} failed: {}", peer.name, e);
                }
            }
        });
        join_all(notices).await;
    }

    /// Stop the background tasks and wait for them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Memberlist {} shut down", self.members.local_name());
    }

    /// Live members, this node included.
    pub fn members(&self) -> Vec<NodeState> {
        self.members.live()
    }

    pub fn num_members(&self) -> usize {
        self.members.num_live()
    }

    pub fn local_node(&self) -> NodeState {
        self.members.local()
    }

    /// Address the gossip listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether `addr` is this node or a live member.
    pub fn knows_addr(&self, addr: &SocketAddr) -> bool {
        self.is_self_addr(addr) || self.members.is_live_addr(addr)
    }

    fn is_self_addr(&self, addr: &SocketAddr) -> bool {
        self.self_addrs.read().contains(addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, peer)) => {
                            let list = Arc::clone(&self);
                            self.tasks.spawn(async move {
                                if let Err(e) = list.handle_conn(socket, peer).await {
                                    debug!("Gossip connection from {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Gossip accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
    }

    async fn handle_conn(&self, socket: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut conn = message::framed(socket, self.config.max_frame_bytes);
        let msg = self
            .with_timeout(peer, self.push_pull_timeout(), message::recv(&mut conn, peer))
            .await?;

        match msg {
            Message::Ping {
                seq,
                from,
                members,
                broadcasts,
            } => {
                if from.name != self.members.local_name() {
                    self.log_changes(self.members.mark_alive(&from, Some(peer)));
                    for change in self.members.merge(&members) {
                        self.log_changes(Some(change));
                    }
                    self.deliver(&broadcasts);
                }

                let ack = Message::Ack {
                    seq,
                    from: self.members.local(),
                    broadcasts: self.outgoing_broadcasts(),
                };
                message::send(&mut conn, &ack).await
            }
            Message::PushPull {
                join,
                from,
                members,
                state,
            } => {
                let is_self = from.name == self.members.local_name();
                if !is_self {
                    self.log_changes(self.members.mark_alive(&from, Some(peer)));
                    for change in self.members.merge(&members) {
                        self.log_changes(Some(change));
                    }
                    self.delegate.merge_remote_state(&state, join);
                }

                let reply = Message::PushPull {
                    join,
                    from: self.members.local(),
                    members: self.members.digest(),
                    state: if is_self {
                        Vec::new()
                    } else {
                        self.delegate.local_state(join)
                    },
                };
                message::send(&mut conn, &reply).await
            }
            Message::Leave { from } => {
                self.log_changes(self.members.leave(&from));
                Ok(())
            }
            Message::Ack { .. } => Err(ClusterError::UnexpectedMessage(peer)),
        }
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.gossip_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }
            if self.left.load(Ordering::Relaxed) {
                continue;
            }

            let reaped = self
                .members
                .reap(self.config.suspicion_timeout(), self.config.dead_node_reclaim());
            for change in reaped {
                self.log_changes(Some(change));
            }

            let targets = self.random_peers(self.config.gossip_nodes);
            if targets.is_empty() {
                continue;
            }

            join_all(targets.iter().map(|peer| self.probe(peer))).await;
        }
    }

    async fn push_pull_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.push_pull_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; join already exchanged state
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }

            if self.left.load(Ordering::Relaxed) {
                continue;
            }
            let Some(peer) = self.random_peers(1).pop() else {
                continue;
            };
            if let Err(e) = self.push_pull(peer.addr, false).await {
                debug!("Push/pull with {} failed: {}", peer.name, e);
            }
        }
    }

    async fn probe(&self, peer: &NodeState) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let ping = Message::Ping {
            seq,
            from: self.members.local(),
            members: self.members.digest(),
            broadcasts: self.outgoing_broadcasts(),
        };

        let exchange = async {
            let mut conn = self.connect(peer.addr).await?;
            message::send(&mut conn, &ping).await?;
            message::recv(&mut conn, peer.addr).await
        };

        match self
            .with_timeout(peer.addr, self.config.probe_timeout(), exchange)
            .await
        {
            Ok(Message::Ack {
                seq: ack_seq,
                from,
                broadcasts,
            }) if ack_seq == seq => {
                self.log_changes(self.members.mark_alive(&from, Some(peer.addr)));
                self.deliver(&broadcasts);
            }
            Ok(_) => {
                debug!("Unexpected reply to ping from {}", peer.name);
                self.members.suspect(&peer.name);
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", peer.name, e);
                self.members.suspect(&peer.name);
            }
        }
    }

    /// Full state exchange with `addr`. `None` if `addr` turned out to be this node.
    async fn push_pull(&self, addr: SocketAddr, join: bool) -> Result<Option<NodeState>> {
        let request = Message::PushPull {
            join,
            from: self.members.local(),
            members: self.members.digest(),
            state: self.delegate.local_state(join),
        };

        let exchange = async {
            let mut conn = self.connect(addr).await?;
            message::send(&mut conn, &request).await?;
            message::recv(&mut conn, addr).await
        };

        let reply = self
            .with_timeout(addr, self.push_pull_timeout(), exchange)
            .await?;

        let Message::PushPull {
            from,
            members,
            state,
            ..
        } = reply
        else {
            return Err(ClusterError::UnexpectedMessage(addr));
        };

        if from.name == self.members.local_name() {
            return Ok(None);
        }

        self.log_changes(self.members.mark_alive(&from, Some(addr)));
        for change in self.members.merge(&members) {
            self.log_changes(Some(change));
        }
        self.delegate.merge_remote_state(&state, join);
        Ok(Some(from))
    }

    async fn send_oneway(&self, addr: SocketAddr, msg: &Message, wait: Duration) -> Result<()> {
        self.with_timeout(addr, wait, async {
            let mut conn = self.connect(addr).await?;
            message::send(&mut conn, msg).await
        })
        .await
    }

    async fn connect(&self, addr: SocketAddr) -> Result<Connection> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(message::framed(stream, self.config.max_frame_bytes))
    }

    async fn with_timeout<T>(
        &self,
        addr: SocketAddr,
        limit: Duration,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(limit, fut)
            .await
            .map_err(|_| ClusterError::Timeout(addr))?
    }

    fn push_pull_timeout(&self) -> Duration {
        self.config.probe_timeout() * PUSH_PULL_TIMEOUT_FACTOR
    }

    // Kept synchronous: the rng must not be held across an await
    fn random_peers(&self, k: usize) -> Vec<NodeState> {
        let peers = self.members.live_peers();
        let mut rng = rand::thread_rng();
        peers.choose_multiple(&mut rng, k).cloned().collect()
    }

    fn outgoing_broadcasts(&self) -> Vec<Vec<u8>> {
        self.delegate
            .get_broadcasts(BROADCAST_OVERHEAD, self.config.max_broadcast_bytes)
            .into_iter()
            .map(|b| b.to_vec())
            .collect()
    }

    fn deliver(&self, broadcasts: &[Vec<u8>]) {
        for msg in broadcasts {
            self.delegate.notify_msg(msg);
        }
    }

    fn log_changes(&self, change: Option<MemberChange>) {
        match change {
            Some(MemberChange::Joined(node)) => {
                info!("Node {} joined at {}", node.name, node.addr)
            }
            Some(MemberChange::Failed(node)) => {
                warn!("Node {} at {} failed", node.name, node.addr)
            }
            Some(MemberChange::Left(node)) => {
                info!("Node {} at {} left", node.name, node.addr)
            }
            None => {}
        }
    }
}

impl std::fmt::Debug for Memberlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memberlist")
            .field("local", &self.members.local())
            .field("local_addr", &self.local_addr)
            .field("members", &self.members.num_live())
            .finish()
    }
}
