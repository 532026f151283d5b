//! Raft integration module.
//!
//! This module provides the KvNode which ties together:
//! - Log storage (RaftLogStorage)
//! - State machine (KvStateMachine)
//! - Network (RaftNetwork over HTTP)
//! - The Raft instance, exposed to the rest of the crate as a ConsensusEngine

mod engine;
mod node;
mod storage;

pub use engine::{ConsensusEngine, EngineStats, RaftEngine, Role};
pub use node::KvNode;
pub use storage::LogStorage;
