//! KvNode - a running replica: raft instance, both listeners and supervision.

use crate::api::ApiServer;
use crate::config::NodeConfig;
use crate::error::{KvError, KvResult};
use crate::network::{NetworkClient, RaftServer};
use crate::raft::engine::{ConsensusEngine, RaftEngine};
use crate::raft::storage::LogStorage;
use crate::router::{KvRouter, RouterSettings};
use crate::state::KvStateMachine;
use crate::types::{KvMetrics, KvNodeId, KvRaft, node_id_for};
use openraft::{Config, Raft};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// A replica of the key-value store.
///
/// Owns the Raft instance, the state machine and the two listeners: raft RPC
/// on the raft address and the client surface on the mapped address. A
/// supervisor task stops everything if the state machine reports a fatal
/// apply.
pub struct KvNode {
    /// This node's ID.
    node_id: KvNodeId,
    /// Raft address, which is also the node's identity.
    raft_addr: String,
    /// The Raft instance.
    raft: Arc<KvRaft>,
    /// The state machine (for local reads).
    state_machine: Arc<KvStateMachine>,
    /// Engine adapter over `raft`.
    engine: Arc<RaftEngine>,
    /// Client-facing router.
    router: Arc<KvRouter>,
    /// Bound raft RPC address.
    raft_local_addr: SocketAddr,
    /// Bound client address.
    api_local_addr: SocketAddr,
    /// Stops both listeners.
    shutdown_tx: watch::Sender<bool>,
}

impl KvNode {
    /// Start a node: open storage, create the Raft instance and serve both
    /// listeners.
    ///
    /// Does not bootstrap or join; call [`KvNode::bootstrap`] or
    /// [`crate::request_join`] afterwards.
    pub async fn start(config: NodeConfig) -> KvResult<Self> {
        config.validate()?;

        let node_id = node_id_for(&config.raft_addr);
        let api_addr = config.api_addr()?;

        let (log_storage, state_machine) = if config.in_memory {
            (LogStorage::in_memory(), KvStateMachine::new())
        } else {
            (
                LogStorage::open(config.data_dir.join("raft"))?,
                KvStateMachine::open(config.data_dir.join("snapshots"))?,
            )
        };
        let state_machine = Arc::new(state_machine);

        let network = NetworkClient::new(config.timeouts.rpc())?;

        let raft_config = Config {
            cluster_name: "raftkv".to_string(),
            election_timeout_min: config.raft.election_timeout_ms.0,
            election_timeout_max: config.raft.election_timeout_ms.1,
            heartbeat_interval: config.raft.heartbeat_interval_ms,
            max_payload_entries: config.raft.max_entries_per_append,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(
                config.snapshot.snapshot_threshold,
            ),
            max_in_snapshot_log_to_keep: config.snapshot.max_log_entries,
            ..Default::default()
        };

        let raft_config = Arc::new(
            raft_config
                .validate()
                .map_err(|e| KvError::Config(e.to_string()))?,
        );

        let raft = Raft::new(
            node_id,
            raft_config,
            network,
            log_storage,
            Arc::clone(&state_machine),
        )
        .await
        .map_err(|e| KvError::Raft(format!("Failed to create Raft: {}", e)))?;
        let raft = Arc::new(raft);

        let engine = Arc::new(RaftEngine::new(node_id, Arc::clone(&raft)));
        let router = Arc::new(KvRouter::new(
            Arc::clone(&engine) as Arc<dyn ConsensusEngine>,
            Arc::clone(&state_machine),
            RouterSettings::from_config(&config),
        )?);

        let raft_listener = TcpListener::bind(&config.raft_addr).await?;
        let raft_local_addr = raft_listener.local_addr()?;
        let api_server = ApiServer::bind(&api_addr, Arc::clone(&router)).await?;
        let api_local_addr = api_server.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(RaftServer::new(Arc::clone(&raft)).serve(raft_listener, shutdown_rx.clone()));
        tokio::spawn(api_server.run(shutdown_rx.clone()));
        tokio::spawn(supervise(
            node_id,
            Arc::clone(&state_machine),
            Arc::clone(&raft),
            shutdown_tx.clone(),
            shutdown_rx,
        ));

        tracing::info!(
            node_id,
            raft_addr = %config.raft_addr,
            api_addr = %api_addr,
            "key-value node started"
        );

        Ok(Self {
            node_id,
            raft_addr: config.raft_addr,
            raft,
            state_machine,
            engine,
            router,
            raft_local_addr,
            api_local_addr,
            shutdown_tx,
        })
    }

    /// Start a brand-new single-member cluster made of this node.
    ///
    /// Fails with [`KvError::AlreadyBootstrapped`] on a node that already has
    /// a configuration.
    pub async fn bootstrap(&self) -> KvResult<()> {
        self.router.membership().bootstrap(&self.raft_addr).await
    }

    /// Admit `peer` (a raft address) as a voter. Must run on the leader.
    pub async fn admit(&self, peer: &str) -> KvResult<()> {
        self.router.admit(Some(peer)).await
    }

    /// Client-facing router.
    pub fn router(&self) -> &Arc<KvRouter> {
        &self.router
    }

    /// Get a reference to the state machine for local reads.
    pub fn state_machine(&self) -> &Arc<KvStateMachine> {
        &self.state_machine
    }

    /// Consensus engine adapter.
    pub fn engine(&self) -> &Arc<RaftEngine> {
        &self.engine
    }

    /// Get this node's ID.
    pub fn node_id(&self) -> KvNodeId {
        self.node_id
    }

    /// Raft address (identity) as configured.
    pub fn raft_addr(&self) -> &str {
        &self.raft_addr
    }

    /// Bound raft RPC socket address.
    pub fn raft_local_addr(&self) -> SocketAddr {
        self.raft_local_addr
    }

    /// Bound client socket address.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_local_addr
    }

    /// Check if this node is the leader.
    pub async fn is_leader(&self) -> bool {
        self.raft.current_leader().await == Some(self.node_id)
    }

    /// Raft address of the current leader, as this node sees it.
    pub fn leader(&self) -> Option<String> {
        self.engine.current_leader()
    }

    /// Get cluster metrics.
    pub fn metrics(&self) -> KvMetrics {
        self.raft.metrics().borrow().clone()
    }

    /// Trigger a snapshot.
    pub async fn trigger_snapshot(&self) -> KvResult<()> {
        self.raft
            .trigger()
            .snapshot()
            .await
            .map_err(|e| KvError::Raft(e.to_string()))?;
        Ok(())
    }

    /// Resolve with the reason once this replica stopped on a fatal apply.
    pub async fn wait_fatal(&self) -> String {
        self.state_machine.wait_fatal().await
    }

    /// Shutdown the node gracefully.
    pub async fn shutdown(&self) -> KvResult<()> {
        self.shutdown_tx.send_replace(true);

        self.raft
            .shutdown()
            .await
            .map_err(|e| KvError::Raft(format!("Shutdown error: {}", e)))?;

        tracing::info!(node_id = self.node_id, "key-value node shutdown");
        Ok(())
    }
}

impl Drop for KvNode {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Stop the listeners and the raft core when the state machine goes fatal.
async fn supervise(
    node_id: KvNodeId,
    state_machine: Arc<KvStateMachine>,
    raft: Arc<KvRaft>,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::select! {
        reason = state_machine.wait_fatal() => {
            tracing::error!(node_id, %reason, "replica is unsafe to continue, stopping");
            shutdown_tx.send_replace(true);
            if let Err(e) = raft.shutdown().await {
                tracing::warn!(node_id, error = %e, "raft shutdown after fatal apply failed");
            }
        }
        _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {}
    }
}
