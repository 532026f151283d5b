//! Type definitions for OpenRaft integration.
//!
//! OpenRaft requires a type configuration that specifies all the concrete types
//! used in the Raft implementation. This module defines the key-value store's
//! type configuration and the mapping from node address to node id.

use crate::command::CommandPayload;
use crate::state::KvResponse;
use openraft::BasicNode;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Node ID type for the cluster.
///
/// Always derived from the node's raft address with [`node_id_for`].
pub type KvNodeId = u64;

openraft::declare_raft_types!(
    /// OpenRaft type configuration for the key-value store.
    pub TypeConfig:
        D = CommandPayload,
        R = KvResponse,
        SnapshotData = Cursor<Vec<u8>>,
);

/// Type alias for Raft instance.
pub type KvRaft = openraft::Raft<TypeConfig>;

/// Type alias for log entry.
pub type KvEntry = openraft::Entry<TypeConfig>;

/// Type alias for vote.
pub type KvVote = openraft::Vote<KvNodeId>;

/// Type alias for log ID.
pub type KvLogId = openraft::LogId<KvNodeId>;

/// Type alias for stored membership.
pub type KvStoredMembership = openraft::StoredMembership<KvNodeId, BasicNode>;

/// Type alias for snapshot metadata.
pub type KvSnapshotMeta = openraft::SnapshotMeta<KvNodeId, BasicNode>;

/// Type alias for snapshot.
pub type KvRaftSnapshot = openraft::storage::Snapshot<TypeConfig>;

/// Type alias for storage error.
pub type KvStorageError = openraft::StorageError<KvNodeId>;

/// Type alias for raft metrics.
pub type KvMetrics = openraft::RaftMetrics<KvNodeId, BasicNode>;

/// Derive the Raft node id for a raft address.
///
/// The address is the node's identity; the numeric id only exists because
/// OpenRaft needs a `Copy` id. It is the first eight bytes of the SHA-256
/// digest of the address, so every node computes the same id for a peer and a
/// restarted node gets its old id back.
pub fn node_id_for(raft_addr: &str) -> KvNodeId {
    let digest = Sha256::digest(raft_addr.as_bytes());
    let mut id = [0u8; 8];
    id.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_travel_as_in_memory_cursors() {
        let data: <TypeConfig as openraft::RaftTypeConfig>::SnapshotData =
            Cursor::new(b"{}".to_vec());
        assert_eq!(data.into_inner(), b"{}");
    }

    #[test]
    fn node_id_is_stable_per_address() {
        assert_eq!(node_id_for("127.0.0.1:5000"), node_id_for("127.0.0.1:5000"));
        assert_ne!(node_id_for("127.0.0.1:5000"), node_id_for("127.0.0.1:5001"));
    }
}
