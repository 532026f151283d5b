//! Types for key-value state management.

use crate::types::KvSnapshotMeta;
use serde::{Deserialize, Serialize};

/// Response from applying a command to the state machine.
///
/// This is what a successful commit returns to the writer on the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KvResponse {
    /// Value the key held before the command, if any.
    pub previous: Option<String>,
}

/// Outcome of applying one committed log entry.
///
/// Callers must branch on the kind. `Fatal` means the entry was agreed on by
/// the cluster but cannot be interpreted here, which is either a bug or
/// cross-replica corruption; the replica must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The command was applied in full.
    Applied(KvResponse),
    /// The entry was not applied and the replica is unsafe to continue.
    Fatal(String),
}

impl ApplyResult {
    /// Whether the entry was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied(_))
    }
}

/// Most recent snapshot, kept for followers that need a snapshot transfer.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    /// Snapshot metadata.
    pub meta: KvSnapshotMeta,
    /// Serialized key-value map.
    pub data: Vec<u8>,
}
