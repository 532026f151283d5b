//! Consensus engine seam.
//!
//! The router and the membership coordinator only see [`ConsensusEngine`].
//! [`RaftEngine`] backs it with OpenRaft; tests back it with an in-process
//! fake.
//!
//! Everything the engine reports about the cluster (role, leader, term) is a
//! local and possibly stale view. Callers read it once per request and never
//! cache it.

use crate::command::CommandPayload;
use crate::error::{InitializeError, KvError, KvResult};
use crate::state::KvResponse;
use crate::types::{KvNodeId, KvRaft, node_id_for};
use async_trait::async_trait;
use openraft::error::RaftError;
use openraft::{BasicNode, ChangeMembers, ServerState};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Role of this node as it currently sees itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts writes.
    Leader,
    /// Replicates from a leader.
    Follower,
    /// Campaigning for leadership.
    Candidate,
    /// Non-voting member catching up.
    Learner,
    /// Stopped.
    Shutdown,
}

impl From<ServerState> for Role {
    fn from(state: ServerState) -> Self {
        match state {
            ServerState::Leader => Role::Leader,
            ServerState::Follower => Role::Follower,
            ServerState::Candidate => Role::Candidate,
            ServerState::Learner => Role::Learner,
            ServerState::Shutdown => Role::Shutdown,
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Current term.
    pub term: u64,
    /// Index of the last log entry, if any.
    pub last_log_index: Option<u64>,
    /// Index of the last applied entry, if any.
    pub last_applied: Option<u64>,
    /// Number of voting members.
    pub voters: usize,
}

/// Operations the key-value layer consumes from its consensus engine.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Replicate `payload` and wait until it is applied locally.
    ///
    /// Gives up after `timeout` with [`KvError::CommitTimeout`]. The command
    /// may still commit afterwards.
    async fn commit(&self, payload: CommandPayload, timeout: Duration) -> KvResult<KvResponse>;

    /// This node's role.
    fn role(&self) -> Role;

    /// Raft address of the leader this node believes in.
    fn current_leader(&self) -> Option<String>;

    /// Engine statistics, including the current term.
    fn stats(&self) -> EngineStats;

    /// Make `address` a voting member identified by `identity`.
    ///
    /// Only the leader can do this; other nodes return an error.
    async fn add_voter(
        &self,
        identity: &str,
        address: &str,
        prev_index: u64,
        timeout: Duration,
    ) -> KvResult<()>;

    /// Create the initial configuration from `members` (raft addresses).
    ///
    /// Fails with [`KvError::AlreadyBootstrapped`] if a configuration exists.
    async fn bootstrap_cluster(&self, members: &[String]) -> KvResult<()>;
}

/// [`ConsensusEngine`] backed by an OpenRaft instance.
pub struct RaftEngine {
    node_id: KvNodeId,
    raft: Arc<KvRaft>,
}

impl RaftEngine {
    /// Wrap a running Raft instance.
    pub fn new(node_id: KvNodeId, raft: Arc<KvRaft>) -> Self {
        Self { node_id, raft }
    }

    /// This node's id.
    pub fn node_id(&self) -> KvNodeId {
        self.node_id
    }
}

#[async_trait]
impl ConsensusEngine for RaftEngine {
    async fn commit(&self, payload: CommandPayload, timeout: Duration) -> KvResult<KvResponse> {
        match tokio::time::timeout(timeout, self.raft.client_write(payload)).await {
            Ok(Ok(resp)) => {
                tracing::debug!(log_id = %resp.log_id, "command committed");
                Ok(resp.data)
            }
            Ok(Err(e)) => Err(KvError::Commit(e.to_string())),
            Err(_) => {
                tracing::warn!(?timeout, "commit not confirmed in time");
                Err(KvError::CommitTimeout(timeout))
            }
        }
    }

    fn role(&self) -> Role {
        self.raft.metrics().borrow().state.into()
    }

    fn current_leader(&self) -> Option<String> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader_id = metrics.current_leader?;
        metrics
            .membership_config
            .nodes()
            .find(|(node_id, _)| **node_id == leader_id)
            .map(|(_, node)| node.addr.clone())
            .filter(|addr| !addr.is_empty())
    }

    fn stats(&self) -> EngineStats {
        let metrics = self.raft.metrics().borrow().clone();
        EngineStats {
            term: metrics.current_term,
            last_log_index: metrics.last_log_index,
            last_applied: metrics.last_applied.map(|log_id| log_id.index),
            voters: metrics.membership_config.membership().voter_ids().count(),
        }
    }

    async fn add_voter(
        &self,
        identity: &str,
        address: &str,
        // OpenRaft serializes membership changes itself
        _prev_index: u64,
        timeout: Duration,
    ) -> KvResult<()> {
        let node_id = node_id_for(identity);
        let node = BasicNode {
            addr: address.to_string(),
        };

        // Node and voter are added in one change; a rejected admit adds neither
        let voter = BTreeMap::from([(node_id, node)]);
        let admit = self
            .raft
            .change_membership(ChangeMembers::AddVoters(voter), false);

        tokio::time::timeout(timeout, admit)
            .await
            .map_err(|_| {
                KvError::Membership(format!("{} not admitted within {:?}", address, timeout))
            })?
            .map_err(|e| KvError::Membership(e.to_string()))?;

        tracing::info!(node_id, %address, "admitted voter");
        Ok(())
    }

    async fn bootstrap_cluster(&self, members: &[String]) -> KvResult<()> {
        let members: BTreeMap<KvNodeId, BasicNode> = members
            .iter()
            .map(|addr| (node_id_for(addr), BasicNode { addr: addr.clone() }))
            .collect();

        match self.raft.initialize(members).await {
            Ok(()) => Ok(()),
            Err(RaftError::APIError(InitializeError::NotAllowed(e))) => {
                Err(KvError::AlreadyBootstrapped(e.to_string()))
            }
            Err(e) => Err(KvError::Membership(e.to_string())),
        }
    }
}
