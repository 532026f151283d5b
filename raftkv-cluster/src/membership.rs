//! Cluster membership: bootstrap and admission of voters.

use crate::error::{KvError, KvResult};
use crate::raft::ConsensusEngine;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use std::time::Duration;

/// Bootstraps new clusters and admits voters through the engine.
pub struct MembershipCoordinator {
    engine: Arc<dyn ConsensusEngine>,
    admit_timeout: Duration,
}

impl MembershipCoordinator {
    /// Create a coordinator over `engine`.
    pub fn new(engine: Arc<dyn ConsensusEngine>, admit_timeout: Duration) -> Self {
        Self {
            engine,
            admit_timeout,
        }
    }

    /// Start a single-member cluster made of this node.
    ///
    /// Fails with [`KvError::AlreadyBootstrapped`] when the node already has
    /// a configuration; the existing membership is left alone.
    pub async fn bootstrap(&self, self_addr: &str) -> KvResult<()> {
        self.engine
            .bootstrap_cluster(&[self_addr.to_string()])
            .await?;
        tracing::info!(addr = %self_addr, "bootstrapped single-node cluster");
        Ok(())
    }

    /// Admit `peer` as a voter; its address is also its identity.
    ///
    /// Only succeeds on the leader. The engine enforces that.
    pub async fn admit(&self, peer: &str) -> KvResult<()> {
        tracing::info!(%peer, "admitting voter");
        self.engine
            .add_voter(peer, peer, 0, self.admit_timeout)
            .await
            .inspect_err(|e| tracing::warn!(%peer, error = %e, "admission rejected"))
    }
}

/// Ask the member serving `member_api_addr` to admit `own_raft_addr`.
///
/// Run by a joining node. The member must be the leader.
pub async fn request_join(
    member_api_addr: &str,
    own_raft_addr: &str,
    timeout: Duration,
) -> KvResult<()> {
    let url = format!(
        "http://{}/join?peerAddress={}",
        member_api_addr,
        utf8_percent_encode(own_raft_addr, NON_ALPHANUMERIC)
    );

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.post(&url).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(KvError::Membership(format!(
            "join rejected by {}: {} {}",
            member_api_addr, status, body
        )));
    }

    tracing::info!(member = %member_api_addr, addr = %own_raft_addr, "joined cluster");
    Ok(())
}
