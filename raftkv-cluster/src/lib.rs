//! Raft-replicated key-value store.
//!
//! Every node keeps a full copy of a string-to-string map. Writes go through
//! the Raft log via OpenRaft and are applied in log order on every replica;
//! reads are served from the local copy.
//!
//! # Architecture
//!
//! ```text
//!   client ──► KvRouter ──► (local read)  KvStateMachine
//!                 │
//!                 ├──► (leader)      ConsensusEngine ──► Raft log ──► apply on every node
//!                 │
//!                 └──► (follower)    forward once to the leader's client address
//! ```
//!
//! A node's raft address is its identity. The client-facing address is
//! derived from it by a fixed [`AddressMapping`] that every node shares.
//!
//! # Usage
//!
//! ```ignore
//! use raftkv_cluster::{KvNode, NodeConfig};
//!
//! let config = NodeConfig::builder()
//!     .raft_addr("127.0.0.1:5000")
//!     .data_dir("./raft-data")
//!     .build()?;
//!
//! let node = KvNode::start(config).await?;
//! node.bootstrap().await?;
//!
//! // curl -XPOST localhost:8000/set -d '{"key":"a","value":"1"}'
//! // curl 'localhost:8000/get?key=a'
//! ```

pub mod api;
pub mod command;
pub mod config;
pub mod error;
mod http;
pub mod membership;
pub mod network;
pub mod raft;
pub mod router;
pub mod state;
pub mod types;

// Re-export main types
pub use api::ApiServer;
pub use command::{CommandPayload, KvCommand};
pub use config::{AddressMapping, NodeConfig};
pub use error::{KvError, KvResult};
pub use membership::{MembershipCoordinator, request_join};
pub use raft::{ConsensusEngine, EngineStats, KvNode, RaftEngine, Role};
pub use router::{
    ClusterStatus, KvRouter, RelayedResponse, RouterSettings, WriteKind, WriteOutcome,
    WriteRequest,
};
pub use state::{ApplyResult, KvResponse, KvSnapshot, KvStateMachine};
pub use types::{KvNodeId, TypeConfig, node_id_for};
