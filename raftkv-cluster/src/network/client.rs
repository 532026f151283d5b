//! Network client implementing OpenRaft's RaftNetwork trait.

use crate::error::{KvResult, RPCError, RaftError};
use crate::types::{KvNodeId, TypeConfig};
use openraft::BasicNode;
use openraft::error::{InstallSnapshotError, NetworkError, RemoteError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{APPEND_PATH, SNAPSHOT_PATH, VOTE_PATH};

/// Factory for creating network connections to other nodes.
///
/// Cheap to clone; all connections share one pooled HTTP client.
#[derive(Clone)]
pub struct NetworkClient {
    http: reqwest::Client,
}

impl NetworkClient {
    /// Create a new network client whose RPCs give up after `rpc_timeout`.
    pub fn new(rpc_timeout: Duration) -> KvResult<Self> {
        let http = reqwest::Client::builder().timeout(rpc_timeout).build()?;
        Ok(Self { http })
    }
}

impl RaftNetworkFactory<TypeConfig> for NetworkClient {
    type Network = NetworkConnection;

    async fn new_client(&mut self, target: KvNodeId, node: &BasicNode) -> Self::Network {
        NetworkConnection {
            target,
            addr: node.addr.clone(),
            http: self.http.clone(),
        }
    }
}

/// A connection to a specific node.
pub struct NetworkConnection {
    /// Target node ID.
    target: KvNodeId,
    /// Target raft address.
    addr: String,
    http: reqwest::Client,
}

impl NetworkConnection {
    async fn send_rpc<Req, Resp, Err>(&self, path: &str, req: &Req) -> Result<Resp, RPCError<Err>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        Err: std::error::Error + DeserializeOwned + 'static,
    {
        let url = format!("http://{}{}", self.addr, path);

        let response = self.http.post(&url).json(req).send().await.map_err(|e| {
            // A refused connection means the peer is down; back off instead of retrying hot
            if e.is_connect() {
                openraft::error::RPCError::Unreachable(Unreachable::new(&e))
            } else {
                openraft::error::RPCError::Network(NetworkError::new(&e))
            }
        })?;

        let result: Result<Resp, RaftError<Err>> = response
            .json()
            .await
            .map_err(|e| openraft::error::RPCError::Network(NetworkError::new(&e)))?;

        result.map_err(|e| openraft::error::RPCError::RemoteError(RemoteError::new(self.target, e)))
    }
}

impl RaftNetwork<TypeConfig> for NetworkConnection {
    async fn append_entries(
        &mut self,
        req: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<KvNodeId>, RPCError> {
        self.send_rpc(APPEND_PATH, &req).await
    }

    async fn install_snapshot(
        &mut self,
        req: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<InstallSnapshotResponse<KvNodeId>, RPCError<InstallSnapshotError>> {
        self.send_rpc(SNAPSHOT_PATH, &req).await
    }

    async fn vote(
        &mut self,
        req: VoteRequest<KvNodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<KvNodeId>, RPCError> {
        self.send_rpc(VOTE_PATH, &req).await
    }
}
