//! Member table: who is in the cluster and in what state.
//!
//! State only moves forward within an incarnation (`Alive < Suspect < Dead < Left`);
//! a higher incarnation always wins. A node that hears it is suspected or dead
//! refutes by bumping its own incarnation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::broadcast::ClusterSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    Alive,
    Suspect,
    Dead,
    Left,
}

impl MemberStatus {
    pub fn is_live(self) -> bool {
        matches!(self, MemberStatus::Alive | MemberStatus::Suspect)
    }
}

/// Gossiped description of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub addr: SocketAddr,
    pub incarnation: u64,
    pub status: MemberStatus,
    pub meta: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Member {
    state: NodeState,
    status_changed: Instant,
}

/// What a merge or probe did to the table; used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberChange {
    Joined(NodeState),
    Failed(NodeState),
    Left(NodeState),
}

#[derive(Debug)]
pub struct Members {
    local: RwLock<NodeState>,
    remote: RwLock<HashMap<String, Member>>,
    size: ClusterSize,
}

impl Members {
    pub fn new(local: NodeState, size: ClusterSize) -> Self {
        size.set(1);
        Self {
            local: RwLock::new(local),
            remote: RwLock::new(HashMap::new()),
            size,
        }
    }

    pub fn local(&self) -> NodeState {
        self.local.read().clone()
    }

    pub fn local_name(&self) -> String {
        self.local.read().name.clone()
    }

    /// Live members including the local node.
    pub fn live(&self) -> Vec<NodeState> {
        let mut out = vec![self.local()];
        out.extend(
            self.remote
                .read()
                .values()
                .filter(|m| m.state.status.is_live())
                .map(|m| m.state.clone()),
        );
        out
    }

    /// Live remote members, candidates for gossip.
    pub fn live_peers(&self) -> Vec<NodeState> {
        self.remote
            .read()
            .values()
            .filter(|m| m.state.status.is_live())
            .map(|m| m.state.clone())
            .collect()
    }

    /// Everything we know, dead and left members included, for dissemination.
    pub fn digest(&self) -> Vec<NodeState> {
        let mut out = vec![self.local()];
        out.extend(self.remote.read().values().map(|m| m.state.clone()));
        out
    }

    pub fn get(&self, name: &str) -> Option<NodeState> {
        self.remote.read().get(name).map(|m| m.state.clone())
    }

    pub fn is_live_addr(&self, addr: &SocketAddr) -> bool {
        self.remote
            .read()
            .values()
            .any(|m| m.state.status.is_live() && m.state.addr == *addr)
    }

    pub fn num_live(&self) -> usize {
        1 + self
            .remote
            .read()
            .values()
            .filter(|m| m.state.status.is_live())
            .count()
    }

    /// Direct contact from `node`: it is alive regardless of gossip about it.
    ///
    /// `peer` is the socket address the contact came from; it replaces an
    /// unspecified advertised IP.
    pub fn mark_alive(&self, node: &NodeState, peer: Option<SocketAddr>) -> Option<MemberChange> {
        if node.name == self.local_name() {
            return None;
        }
        if node.status == MemberStatus::Left {
            return self.leave(node);
        }

        let mut state = node.clone();
        state.status = MemberStatus::Alive;
        if state.addr.ip().is_unspecified()
            && let Some(peer) = peer
        {
            state.addr.set_ip(peer.ip());
        }

        let change = {
            let mut remote = self.remote.write();
            match remote.get_mut(&state.name) {
                Some(member) => {
                    let was_live = member.state.status.is_live();
                    state.incarnation = state.incarnation.max(member.state.incarnation);
                    if member.state.status != MemberStatus::Alive {
                        member.status_changed = Instant::now();
                    }
                    member.state = state.clone();
                    (!was_live).then(|| MemberChange::Joined(state))
                }
                None => {
                    remote.insert(
                        state.name.clone(),
                        Member {
                            state: state.clone(),
                            status_changed: Instant::now(),
                        },
                    );
                    Some(MemberChange::Joined(state))
                }
            }
        };

        self.update_size();
        change
    }

    /// Merge gossiped member states.
    pub fn merge(&self, states: &[NodeState]) -> Vec<MemberChange> {
        let local_name = self.local_name();
        let mut changes = Vec::new();

        {
            let mut remote = self.remote.write();
            for state in states {
                if state.name == local_name {
                    self.refute(state);
                    continue;
                }

                match remote.get_mut(&state.name) {
                    None => {
                        // Unknown nodes are only learned while live
                        if state.status.is_live() {
                            remote.insert(
                                state.name.clone(),
                                Member {
                                    state: state.clone(),
                                    status_changed: Instant::now(),
                                },
                            );
                            changes.push(MemberChange::Joined(state.clone()));
                        }
                    }
                    Some(member) => {
                        let newer = state.incarnation > member.state.incarnation;
                        let worse = state.incarnation == member.state.incarnation
                            && state.status > member.state.status;
                        if !(newer || worse) {
                            continue;
                        }

                        let was_live = member.state.status.is_live();
                        if member.state.status != state.status {
                            member.status_changed = Instant::now();
                        }
                        member.state = state.clone();

                        match (was_live, state.status) {
                            (true, MemberStatus::Dead) => {
                                changes.push(MemberChange::Failed(state.clone()))
                            }
                            (true, MemberStatus::Left) => {
                                changes.push(MemberChange::Left(state.clone()))
                            }
                            (false, s) if s.is_live() => {
                                changes.push(MemberChange::Joined(state.clone()))
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        self.update_size();
        changes
    }

    /// A probe of `name` failed.
    pub fn suspect(&self, name: &str) {
        let mut remote = self.remote.write();
        if let Some(member) = remote.get_mut(name)
            && member.state.status == MemberStatus::Alive
        {
            member.state.status = MemberStatus::Suspect;
            member.status_changed = Instant::now();
        }
    }

    /// `name` announced a clean departure.
    pub fn leave(&self, node: &NodeState) -> Option<MemberChange> {
        let change = {
            let mut remote = self.remote.write();
            let member = remote.get_mut(&node.name)?;
            if !member.state.status.is_live() {
                return None;
            }
            member.state.status = MemberStatus::Left;
            member.state.incarnation = member.state.incarnation.max(node.incarnation);
            member.status_changed = Instant::now();
            MemberChange::Left(member.state.clone())
        };
        self.update_size();
        Some(change)
    }

    /// Declare suspects older than `suspicion_timeout` dead and forget dead or left
    /// members older than `reclaim`.
    pub fn reap(&self, suspicion_timeout: Duration, reclaim: Duration) -> Vec<MemberChange> {
        let mut changes = Vec::new();

        {
            let mut remote = self.remote.write();
            for member in remote.values_mut() {
                if member.state.status == MemberStatus::Suspect
                    && member.status_changed.elapsed() >= suspicion_timeout
                {
                    member.state.status = MemberStatus::Dead;
                    member.status_changed = Instant::now();
                    changes.push(MemberChange::Failed(member.state.clone()));
                }
            }
            remote.retain(|_, m| m.state.status.is_live() || m.status_changed.elapsed() < reclaim);
        }

        self.update_size();
        changes
    }

    /// Announce our own departure: the local entry becomes `Left`.
    pub fn set_local_left(&self) -> NodeState {
        let mut local = self.local.write();
        local.incarnation += 1;
        local.status = MemberStatus::Left;
        local.clone()
    }

    fn refute(&self, gossip_about_us: &NodeState) {
        if gossip_about_us.status == MemberStatus::Alive {
            return;
        }
        let mut local = self.local.write();
        if local.status == MemberStatus::Left {
            return;
        }
        if gossip_about_us.incarnation >= local.incarnation {
            local.incarnation = gossip_about_us.incarnation + 1;
            tracing::debug!(
                "Refuting {:?} about {} with incarnation {}",
                gossip_about_us.status,
                local.name,
                local.incarnation
            );
        }
    }

    fn update_size(&self) {
        self.size.set(self.num_live());
    }
}
