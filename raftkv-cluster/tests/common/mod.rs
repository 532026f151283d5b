//! Common test utilities for raftkv-cluster tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use raftkv_cluster::{
    ApiServer, ApplyResult, CommandPayload, ConsensusEngine, EngineStats, KvError, KvNode,
    KvResponse, KvResult, KvRouter, KvStateMachine, NodeConfig, Role, RouterSettings,
    request_join,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;

/// Atomic counter for allocating unique raft ports.
///
/// Client ports are raft port + 3000, so the range stays below 60000.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(21000);

/// Get a unique raft port for testing.
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Mutable view the fake engine reports.
#[derive(Debug, Clone)]
pub struct FakeView {
    pub role: Role,
    pub leader: Option<String>,
    pub term: u64,
    pub commit_delay: Duration,
    pub commit_error: Option<String>,
    pub bootstrapped: bool,
    pub voters: Vec<String>,
    pub reject_admit: Option<String>,
}

impl Default for FakeView {
    fn default() -> Self {
        Self {
            role: Role::Follower,
            leader: None,
            term: 1,
            commit_delay: Duration::ZERO,
            commit_error: None,
            bootstrapped: false,
            voters: Vec::new(),
            reject_admit: None,
        }
    }
}

/// In-process consensus engine: commits apply straight to one state machine.
pub struct FakeEngine {
    state_machine: Arc<KvStateMachine>,
    view: Mutex<FakeView>,
    commits: Mutex<Vec<Vec<u8>>>,
}

impl FakeEngine {
    pub fn new(state_machine: Arc<KvStateMachine>) -> Self {
        Self {
            state_machine,
            view: Mutex::new(FakeView::default()),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Change what the engine reports.
    pub fn update(&self, f: impl FnOnce(&mut FakeView)) {
        f(&mut self.view.lock());
    }

    pub fn view(&self) -> FakeView {
        self.view.lock().clone()
    }

    /// Payloads handed to `commit`, in order.
    pub fn commits(&self) -> Vec<Vec<u8>> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl ConsensusEngine for FakeEngine {
    async fn commit(&self, payload: CommandPayload, timeout: Duration) -> KvResult<KvResponse> {
        let (delay, error) = {
            let view = self.view.lock();
            (view.commit_delay, view.commit_error.clone())
        };

        self.commits.lock().push(payload.0.clone());

        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(KvError::CommitTimeout(timeout));
        }
        tokio::time::sleep(delay).await;

        if let Some(error) = error {
            return Err(KvError::Commit(error));
        }

        match self.state_machine.apply_entry(payload.as_bytes()).await {
            ApplyResult::Applied(resp) => Ok(resp),
            ApplyResult::Fatal(reason) => Err(KvError::Fatal(reason)),
        }
    }

    fn role(&self) -> Role {
        self.view.lock().role
    }

    fn current_leader(&self) -> Option<String> {
        self.view.lock().leader.clone()
    }

    fn stats(&self) -> EngineStats {
        let view = self.view.lock();
        EngineStats {
            term: view.term,
            voters: view.voters.len(),
            ..Default::default()
        }
    }

    async fn add_voter(
        &self,
        identity: &str,
        address: &str,
        _prev_index: u64,
        _timeout: Duration,
    ) -> KvResult<()> {
        assert_eq!(identity, address, "identity and address must match");
        let mut view = self.view.lock();
        if let Some(reason) = &view.reject_admit {
            return Err(KvError::Membership(reason.clone()));
        }
        if view.role != Role::Leader {
            return Err(KvError::Membership("not the leader".to_string()));
        }
        view.voters.push(address.to_string());
        Ok(())
    }

    async fn bootstrap_cluster(&self, members: &[String]) -> KvResult<()> {
        let mut view = self.view.lock();
        if view.bootstrapped {
            return Err(KvError::AlreadyBootstrapped(
                "node already has a configuration".to_string(),
            ));
        }
        view.bootstrapped = true;
        view.voters = members.to_vec();
        view.role = Role::Leader;
        view.leader = members.first().cloned();
        Ok(())
    }
}

/// A router wired to a fake engine.
pub struct FakeReplica {
    pub engine: Arc<FakeEngine>,
    pub state_machine: Arc<KvStateMachine>,
    pub router: Arc<KvRouter>,
}

impl FakeReplica {
    pub fn new() -> Self {
        Self::with_settings(RouterSettings {
            forward_timeout: Duration::from_secs(2),
            ..Default::default()
        })
    }

    pub fn with_settings(settings: RouterSettings) -> Self {
        let state_machine = Arc::new(KvStateMachine::new());
        let engine = Arc::new(FakeEngine::new(Arc::clone(&state_machine)));
        let router = Arc::new(
            KvRouter::new(
                Arc::clone(&engine) as Arc<dyn ConsensusEngine>,
                Arc::clone(&state_machine),
                settings,
            )
            .expect("router"),
        );
        Self {
            engine,
            state_machine,
            router,
        }
    }

    /// Serve this replica's client surface on an ephemeral port.
    pub async fn serve(&self) -> (SocketAddr, watch::Sender<bool>) {
        let server = ApiServer::bind("127.0.0.1:0", Arc::clone(&self.router))
            .await
            .expect("bind api server");
        let addr = server.local_addr().expect("local addr");
        let (tx, rx) = watch::channel(false);
        tokio::spawn(server.run(rx));
        (addr, tx)
    }
}

/// Build a node config for tests: fast elections, short timeouts.
pub fn test_config(raft_addr: &str, data_dir: Option<&std::path::Path>) -> NodeConfig {
    let builder = NodeConfig::builder()
        .raft_addr(raft_addr)
        .election_timeout_ms(300, 600)
        .heartbeat_interval_ms(50)
        .commit_timeout_ms(2_000);

    let builder = match data_dir {
        Some(dir) => builder.data_dir(dir),
        None => builder.in_memory(true),
    };
    builder.build().expect("Invalid config")
}

/// Test context that holds temp directories and nodes.
pub struct TestCluster {
    /// Temp directories for each node (kept alive for the test duration).
    _temp_dirs: Vec<TempDir>,
    /// Cluster nodes.
    pub nodes: Vec<KvNode>,
    /// Raft addresses.
    pub addresses: Vec<String>,
}

impl TestCluster {
    /// Start `node_count` nodes; none of them is bootstrapped yet.
    pub async fn new(node_count: usize) -> Self {
        let mut temp_dirs = Vec::with_capacity(node_count);
        let mut nodes = Vec::with_capacity(node_count);
        let mut addresses = Vec::with_capacity(node_count);

        for _ in 0..node_count {
            let addr = format!("127.0.0.1:{}", get_test_port());
            let temp_dir = TempDir::new().expect("Failed to create temp dir");

            let config = test_config(&addr, Some(temp_dir.path()));
            let node = KvNode::start(config).await.expect("Failed to start node");

            temp_dirs.push(temp_dir);
            addresses.push(addr);
            nodes.push(node);
        }

        Self {
            _temp_dirs: temp_dirs,
            nodes,
            addresses,
        }
    }

    /// Bootstrap the first node.
    pub async fn bootstrap(&self) {
        self.nodes[0]
            .bootstrap()
            .await
            .expect("Failed to bootstrap cluster");
    }

    /// Join every other node through the first node's client surface.
    pub async fn join_all(&self) {
        let member = self.nodes[0].api_addr().to_string();
        for addr in &self.addresses[1..] {
            request_join(&member, addr, Duration::from_secs(10))
                .await
                .expect("Failed to join");
        }
    }

    /// Wait until some node reports a leader; returns its raft address.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<String> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            for node in &self.nodes {
                if let Some(leader) = node.leader() {
                    return Some(leader);
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    /// Index of the node whose raft address is `addr`.
    pub fn index_of(&self, addr: &str) -> usize {
        self.addresses
            .iter()
            .position(|a| a == addr)
            .expect("unknown node address")
    }

    /// Shutdown all nodes.
    pub async fn shutdown(&mut self) {
        for node in &self.nodes {
            let _ = node.shutdown().await;
        }
    }
}

/// Poll `node` until `key` holds `expected` (or is absent when `None`).
pub async fn wait_for_value(
    node: &KvNode,
    key: &str,
    expected: Option<&str>,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if node.state_machine().get(key).await.as_deref() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Client for talking to a node's HTTP surface.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("http client")
}
