//! Trait implementations for OpenRaft integration.

use crate::error::KvError;
use crate::state::snapshot::{KvSnapshot, read_snapshot};
use crate::types::{
    KvEntry, KvLogId, KvRaftSnapshot, KvSnapshotMeta, KvStorageError, KvStoredMembership,
    TypeConfig,
};
use openraft::storage::RaftStateMachine;
use openraft::{
    EntryPayload, RaftSnapshotBuilder, RaftTypeConfig, StorageIOError, StoredMembership,
};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::KvStateMachine;
use super::apply::apply_payload;
use super::types::{ApplyResult, KvResponse, StoredSnapshot};

/// Builds a consistent snapshot of the key-value map for log compaction and
/// state transfer to new nodes.
impl RaftSnapshotBuilder<TypeConfig> for Arc<KvStateMachine> {
    async fn build_snapshot(&mut self) -> Result<KvRaftSnapshot, KvStorageError> {
        let state = self.state.read().await;

        let data = KvSnapshot::new(state.data.clone())
            .to_bytes()
            .map_err(|e| StorageIOError::read_state_machine(&e))?;

        let last_applied_log = state.last_applied_log;
        let last_membership = state.last_membership.clone();

        // Lock snapshot before releasing state lock
        let mut current_snapshot = self.current_snapshot.write().await;
        drop(state);

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = if let Some(last) = last_applied_log {
            format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx)
        } else {
            format!("--{}", snapshot_idx)
        };

        let meta = KvSnapshotMeta {
            last_log_id: last_applied_log,
            last_membership,
            snapshot_id,
        };

        let snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: data.clone(),
        };

        self.save_snapshot_file(&snapshot)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        *current_snapshot = Some(snapshot);

        tracing::info!(snapshot_id = %meta.snapshot_id, bytes = data.len(), "built snapshot");

        Ok(KvRaftSnapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

/// Applies committed log entries to the key-value map.
///
/// A normal entry that fails to decode raises the fatal signal and fails the
/// apply with a storage error, which stops the Raft core on this node. The
/// entry is not marked as applied.
impl RaftStateMachine<TypeConfig> for Arc<KvStateMachine> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<KvLogId>, KvStoredMembership), KvStorageError> {
        let state = self.state.read().await;
        Ok((state.last_applied_log, state.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<KvResponse>, KvStorageError>
    where
        I: IntoIterator<Item = KvEntry> + Send,
    {
        let mut responses = Vec::new();
        let mut state = self.state.write().await;

        for entry in entries {
            tracing::debug!(%entry.log_id, "applying to state machine");

            if let Some(reason) = self.fatal_reason() {
                return Err(StorageIOError::apply(entry.log_id, &KvError::Fatal(reason)).into());
            }

            match entry.payload {
                EntryPayload::Blank => {
                    responses.push(KvResponse::default());
                }
                EntryPayload::Normal(payload) => match apply_payload(&mut state, payload.as_bytes())
                {
                    ApplyResult::Applied(resp) => responses.push(resp),
                    ApplyResult::Fatal(reason) => {
                        self.raise_fatal(reason.clone());
                        return Err(
                            StorageIOError::apply(entry.log_id, &KvError::Fatal(reason)).into()
                        );
                    }
                },
                EntryPayload::Membership(membership) => {
                    state.last_membership = StoredMembership::new(Some(entry.log_id), membership);
                    responses.push(KvResponse::default());
                }
            }

            state.last_applied_log = Some(entry.log_id);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        Arc::clone(self)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, KvStorageError> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &KvSnapshotMeta,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), KvStorageError> {
        tracing::info!(
            snapshot_id = %meta.snapshot_id,
            snapshot_size = snapshot.get_ref().len(),
            "installing snapshot"
        );

        let new_snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: snapshot.into_inner(),
        };

        // Parse fully before touching state
        let data = read_snapshot(new_snapshot.data.as_slice())
            .map_err(|e| StorageIOError::read_snapshot(Some(new_snapshot.meta.signature()), &e))?;

        let mut state = self.state.write().await;
        state.data = data;
        state.last_applied_log = meta.last_log_id;
        state.last_membership = meta.last_membership.clone();

        // Lock snapshot before releasing state lock
        let mut current_snapshot = self.current_snapshot.write().await;
        drop(state);

        self.save_snapshot_file(&new_snapshot)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        *current_snapshot = Some(new_snapshot);
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<KvRaftSnapshot>, KvStorageError> {
        match &*self.current_snapshot.read().await {
            Some(snapshot) => {
                let data = snapshot.data.clone();
                Ok(Some(KvRaftSnapshot {
                    meta: snapshot.meta.clone(),
                    snapshot: Box::new(Cursor::new(data)),
                }))
            }
            None => Ok(None),
        }
    }
}
