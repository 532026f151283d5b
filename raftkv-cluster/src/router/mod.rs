//! Leader-aware request router.
//!
//! The single client-facing entry point. Reads are served from the local
//! state machine. Writes are committed here when this node leads and are
//! otherwise forwarded, once, to the leader's client address.
//!
//! The cluster view (role, leader, term) is read from the engine once per
//! request. No lock on the key-value state is held across engine calls or
//! forwarding.

mod forward;

pub use forward::{FORWARDED_HEADER, LeaderForwarder, RelayedResponse};

use crate::command::KvCommand;
use crate::config::{AddressMapping, NodeConfig};
use crate::error::{KvError, KvResult};
use crate::membership::MembershipCoordinator;
use crate::raft::{ConsensusEngine, Role};
use crate::state::KvStateMachine;
use bytes::Bytes;
use hyper::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Timeouts and address mapping used by the router.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Raft address to client address rule, shared by the whole cluster.
    pub mapping: AddressMapping,
    /// Bound on a leader-local commit.
    pub commit_timeout: Duration,
    /// Bound on one forwarding round trip.
    pub forward_timeout: Duration,
    /// Bound on admitting a voter.
    pub admit_timeout: Duration,
}

impl RouterSettings {
    /// Settings derived from a node configuration.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            mapping: config.address_mapping,
            commit_timeout: config.timeouts.commit(),
            forward_timeout: config.timeouts.forward(),
            admit_timeout: config.timeouts.admit(),
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&NodeConfig::default())
    }
}

/// Which write endpoint a request came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// `/set`
    Set,
    /// `/delete`
    Delete,
}

/// A client write, kept in its original form so it can be forwarded verbatim.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Endpoint kind.
    pub kind: WriteKind,
    /// HTTP method.
    pub method: Method,
    /// Path plus query string, as received.
    pub path_and_query: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Bytes,
}

#[derive(Deserialize)]
struct SetBody {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct DeleteBody {
    key: String,
}

impl WriteRequest {
    /// Whether another node already forwarded this request.
    pub fn is_forwarded(&self) -> bool {
        self.headers.contains_key(FORWARDED_HEADER)
    }

    /// Parse the body into the command it asks for.
    pub fn command(&self) -> KvResult<KvCommand> {
        let malformed = |e: serde_json::Error| KvError::MalformedBody(e.to_string());
        let cmd = match self.kind {
            WriteKind::Set => {
                let body: SetBody = serde_json::from_slice(&self.body).map_err(malformed)?;
                KvCommand::set(body.key, body.value)
            }
            WriteKind::Delete => {
                let body: DeleteBody = serde_json::from_slice(&self.body).map_err(malformed)?;
                KvCommand::delete(body.key)
            }
        };

        if cmd.key().is_empty() {
            return Err(KvError::MalformedBody("key must not be empty".to_string()));
        }
        Ok(cmd)
    }
}

/// How a write was completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Committed through the local engine; this node is the leader.
    Committed,
    /// Handled by the leader; its response is to be relayed unchanged.
    Forwarded(RelayedResponse),
}

/// Locally perceived cluster facts. May be stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Whether this node believes it is the leader.
    pub is_leader: bool,
    /// Raft address of the believed leader, empty when unknown.
    pub leader: String,
    /// Current term.
    pub term: u64,
}

/// Routes client operations to the state machine, the engine or the leader.
pub struct KvRouter {
    engine: Arc<dyn ConsensusEngine>,
    state_machine: Arc<KvStateMachine>,
    mapping: AddressMapping,
    commit_timeout: Duration,
    forwarder: LeaderForwarder,
    membership: MembershipCoordinator,
}

impl KvRouter {
    /// Create a router over `engine` and the local `state_machine`.
    pub fn new(
        engine: Arc<dyn ConsensusEngine>,
        state_machine: Arc<KvStateMachine>,
        settings: RouterSettings,
    ) -> KvResult<Self> {
        Ok(Self {
            membership: MembershipCoordinator::new(Arc::clone(&engine), settings.admit_timeout),
            forwarder: LeaderForwarder::new(settings.forward_timeout)?,
            engine,
            state_machine,
            mapping: settings.mapping,
            commit_timeout: settings.commit_timeout,
        })
    }

    /// Membership coordinator sharing this router's engine.
    pub fn membership(&self) -> &MembershipCoordinator {
        &self.membership
    }

    /// Local state machine.
    pub fn state_machine(&self) -> &Arc<KvStateMachine> {
        &self.state_machine
    }

    /// Local read. A follower may return stale data.
    pub async fn read(&self, key: Option<&str>) -> KvResult<String> {
        self.state_machine.ensure_healthy()?;

        let key = key
            .filter(|k| !k.is_empty())
            .ok_or(KvError::MissingParameter("key"))?;

        self.state_machine
            .get(key)
            .await
            .ok_or_else(|| KvError::NotFound(key.to_string()))
    }

    /// Commit `req` locally when leading, otherwise forward it to the leader.
    ///
    /// A commit that times out is reported as failed but may still take
    /// effect. Clients that need exactly-once behaviour must make their
    /// writes idempotent.
    pub async fn write(&self, req: WriteRequest) -> KvResult<WriteOutcome> {
        self.state_machine.ensure_healthy()?;

        if self.engine.role() == Role::Leader {
            let cmd = req.command()?;
            let payload = cmd.encode()?;
            self.engine.commit(payload, self.commit_timeout).await?;
            tracing::debug!(op = cmd.name(), key = cmd.key(), "write committed");
            return Ok(WriteOutcome::Committed);
        }

        let leader = self.engine.current_leader().filter(|l| !l.is_empty());

        if req.is_forwarded() {
            tracing::warn!(?leader, "refusing to forward an already forwarded write");
            return Err(KvError::NotLeader { leader });
        }

        let leader = leader.ok_or(KvError::LeaderUnknown)?;
        let target = self
            .mapping
            .client_addr(&leader)
            .map_err(|e| KvError::UpstreamUnavailable {
                leader: leader.clone(),
                cause: e.to_string(),
            })?;

        let relayed = self.forwarder.forward(&target, &req).await?;
        Ok(WriteOutcome::Forwarded(relayed))
    }

    /// Locally perceived role, leader and term. Never blocks on consensus.
    pub fn status(&self) -> KvResult<ClusterStatus> {
        self.state_machine.ensure_healthy()?;

        Ok(ClusterStatus {
            is_leader: self.engine.role() == Role::Leader,
            leader: self.engine.current_leader().unwrap_or_default(),
            term: self.engine.stats().term,
        })
    }

    /// Admit `peer` (a raft address) as a voting member.
    pub async fn admit(&self, peer: Option<&str>) -> KvResult<()> {
        self.state_machine.ensure_healthy()?;

        let peer = peer
            .filter(|p| !p.is_empty())
            .ok_or(KvError::MissingParameter("peerAddress"))?;

        self.mapping
            .client_addr(peer)
            .map_err(|e| KvError::InvalidParameter {
                name: "peerAddress",
                reason: e.to_string(),
            })?;

        self.membership.admit(peer).await
    }
}
