//! Node configuration.

use crate::error::{KvError, KvResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a key-value node.
///
/// `raft_addr` is the node's identity. It is the OpenRaft member address, the
/// address the raft RPC server binds to, and the input of the
/// [`AddressMapping`] that yields the client-facing address. It must stay the
/// same across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Raft address and node identity (e.g., "127.0.0.1:5000").
    pub raft_addr: String,

    /// Rule deriving the client-facing address from a raft address.
    pub address_mapping: AddressMapping,

    /// Directory for Raft log and snapshot storage.
    pub data_dir: PathBuf,

    /// Keep log, vote and snapshots in memory only.
    pub in_memory: bool,

    /// Raft timing configuration.
    pub raft: RaftConfig,

    /// Snapshot configuration.
    pub snapshot: SnapshotConfig,

    /// Client-path and RPC timeouts.
    pub timeouts: TimeoutConfig,
}

/// Fixed rule mapping a raft address to the client-facing address.
///
/// Must be identical on every node of a cluster, otherwise followers forward
/// writes to the wrong port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMapping {
    /// Added to the raft port to get the client port.
    pub api_port_offset: u16,
}

/// Raft timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Election timeout range (min, max) in milliseconds.
    /// Should be >> heartbeat_interval to avoid spurious elections.
    pub election_timeout_ms: (u64, u64),

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Maximum entries per AppendEntries RPC.
    pub max_entries_per_append: u64,
}

/// Snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Create snapshot after this many log entries.
    pub snapshot_threshold: u64,

    /// Number of log entries to keep after a snapshot for lagging followers.
    pub max_log_entries: u64,
}

/// Timeouts bounding every blocking point of the client path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Bound on a leader-local commit.
    pub commit_ms: u64,
    /// Bound on one forwarding round trip to the leader.
    pub forward_ms: u64,
    /// Bound on admitting a new voter.
    pub admit_ms: u64,
    /// Bound on a single raft RPC between nodes.
    pub rpc_ms: u64,
    /// Bound on the join request a new node sends to a member.
    pub join_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            raft_addr: "127.0.0.1:5000".to_string(),
            address_mapping: AddressMapping::default(),
            data_dir: PathBuf::from("./raft-data"),
            in_memory: false,
            raft: RaftConfig::default(),
            snapshot: SnapshotConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for AddressMapping {
    fn default() -> Self {
        // :5000 -> :8000
        Self {
            api_port_offset: 3000,
        }
    }
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_ms: (150, 300),
            heartbeat_interval_ms: 50,
            max_entries_per_append: 100,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            snapshot_threshold: 10_000,
            max_log_entries: 1_000,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            commit_ms: 500,
            forward_ms: 5_000,
            admit_ms: 10_000,
            rpc_ms: 10_000,
            join_ms: 5_000,
        }
    }
}

impl AddressMapping {
    /// Create a mapping with the given port offset.
    pub fn with_offset(api_port_offset: u16) -> Self {
        Self { api_port_offset }
    }

    /// Derive the client-facing address for a raft address.
    pub fn client_addr(&self, raft_addr: &str) -> KvResult<String> {
        let (host, port) = split_host_port(raft_addr)?;
        let api_port = port.checked_add(self.api_port_offset).ok_or_else(|| {
            KvError::Config(format!(
                "api port for {} overflows (offset {})",
                raft_addr, self.api_port_offset
            ))
        })?;
        Ok(format!("{}:{}", host, api_port))
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
fn split_host_port(addr: &str) -> KvResult<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| KvError::Config(format!("address {:?} is not host:port", addr)))?;

    if host.is_empty() {
        return Err(KvError::Config(format!("address {:?} has no host", addr)));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| KvError::Config(format!("address {:?} has an invalid port", addr)))?;
    if port == 0 {
        return Err(KvError::Config(format!("address {:?} has port 0", addr)));
    }

    Ok((host, port))
}

impl TimeoutConfig {
    /// Commit timeout as a Duration.
    pub fn commit(&self) -> Duration {
        Duration::from_millis(self.commit_ms)
    }

    /// Forward timeout as a Duration.
    pub fn forward(&self) -> Duration {
        Duration::from_millis(self.forward_ms)
    }

    /// Admit timeout as a Duration.
    pub fn admit(&self) -> Duration {
        Duration::from_millis(self.admit_ms)
    }

    /// Raft RPC timeout as a Duration.
    pub fn rpc(&self) -> Duration {
        Duration::from_millis(self.rpc_ms)
    }

    /// Join request timeout as a Duration.
    pub fn join(&self) -> Duration {
        Duration::from_millis(self.join_ms)
    }
}

impl NodeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }

    /// Client-facing address derived from this node's raft address.
    pub fn api_addr(&self) -> KvResult<String> {
        self.address_mapping.client_addr(&self.raft_addr)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> KvResult<()> {
        if self.raft_addr.is_empty() {
            return Err(KvError::Config("raft_addr is required".to_string()));
        }

        split_host_port(&self.raft_addr)?;
        self.api_addr()?;

        let (min_election, max_election) = self.raft.election_timeout_ms;
        if min_election >= max_election {
            return Err(KvError::Config(format!(
                "election_timeout_ms min ({}) must be < max ({})",
                min_election, max_election
            )));
        }

        if self.raft.heartbeat_interval_ms >= min_election / 2 {
            return Err(KvError::Config(format!(
                "heartbeat_interval_ms ({}) should be << election_timeout_ms ({})",
                self.raft.heartbeat_interval_ms, min_election
            )));
        }

        let t = &self.timeouts;
        if [t.commit_ms, t.forward_ms, t.admit_ms, t.rpc_ms, t.join_ms].contains(&0) {
            return Err(KvError::Config("timeouts must be non-zero".to_string()));
        }

        if !self.in_memory && self.data_dir.as_os_str().is_empty() {
            return Err(KvError::Config(
                "data_dir is required unless in_memory is set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for NodeConfig.
#[derive(Debug, Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Set the raft address (node identity).
    pub fn raft_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.raft_addr = addr.into();
        self
    }

    /// Set the client port offset.
    pub fn api_port_offset(mut self, offset: u16) -> Self {
        self.config.address_mapping = AddressMapping::with_offset(offset);
        self
    }

    /// Set the data directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Keep all raft state in memory.
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.config.in_memory = in_memory;
        self
    }

    /// Set election timeout range in milliseconds.
    pub fn election_timeout_ms(mut self, min: u64, max: u64) -> Self {
        self.config.raft.election_timeout_ms = (min, max);
        self
    }

    /// Set heartbeat interval in milliseconds.
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.raft.heartbeat_interval_ms = ms;
        self
    }

    /// Set snapshot threshold.
    pub fn snapshot_threshold(mut self, entries: u64) -> Self {
        self.config.snapshot.snapshot_threshold = entries;
        self
    }

    /// Set the commit timeout in milliseconds.
    pub fn commit_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.commit_ms = ms;
        self
    }

    /// Set the forward timeout in milliseconds.
    pub fn forward_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.forward_ms = ms;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> KvResult<NodeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_moves_5000_to_8000() {
        let mapping = AddressMapping::default();
        assert_eq!(
            mapping.client_addr("127.0.0.1:5000").unwrap(),
            "127.0.0.1:8000"
        );
        assert_eq!(mapping.client_addr("node-a:5001").unwrap(), "node-a:8001");
    }

    #[test]
    fn mapping_keeps_ipv6_brackets() {
        let mapping = AddressMapping::with_offset(10);
        assert_eq!(mapping.client_addr("[::1]:5000").unwrap(), "[::1]:5010");
    }

    #[test]
    fn mapping_rejects_malformed_addresses() {
        let mapping = AddressMapping::default();
        assert!(mapping.client_addr("").is_err());
        assert!(mapping.client_addr("localhost").is_err());
        assert!(mapping.client_addr(":5000").is_err());
        assert!(mapping.client_addr("host:port").is_err());
        assert!(mapping.client_addr("host:0").is_err());
        assert!(mapping.client_addr("host:65000").is_err());
    }

    #[test]
    fn builder_validates() {
        let config = NodeConfig::builder()
            .raft_addr("127.0.0.1:5000")
            .in_memory(true)
            .build()
            .unwrap();
        assert_eq!(config.api_addr().unwrap(), "127.0.0.1:8000");
        assert_eq!(config.timeouts.commit(), Duration::from_millis(500));

        assert!(NodeConfig::builder().raft_addr("nope").build().is_err());
        assert!(
            NodeConfig::builder()
                .raft_addr("127.0.0.1:64000")
                .build()
                .is_err()
        );
        assert!(
            NodeConfig::builder()
                .heartbeat_interval_ms(100)
                .build()
                .is_err()
        );
        assert!(NodeConfig::builder().commit_timeout_ms(0).build().is_err());
    }
}
