//! Raft log storage.
//!
//! This implements OpenRaft's RaftLogStorage trait on top of an in-memory
//! index, optionally backed by a directory:
//!
//! ```text
//! <data_dir>/raft/
//! ├── meta.json      # Metadata (last_purged_log_id, committed)
//! ├── vote.json      # Vote state
//! └── log.ndjson     # One JSON entry per line
//! ```
//!
//! Without a directory the storage is volatile and the node forgets its log
//! and vote on restart.

mod inner;
mod persistence;

use crate::types::{KvEntry, KvLogId, KvStorageError, KvVote, TypeConfig};
use inner::LogStorageInner;
use openraft::storage::{LogFlushed, RaftLogStorage};
use openraft::{LogState, RaftLogReader, StorageIOError};
use persistence::PersistenceOps;
use std::fmt::Debug;
use std::fs;
use std::ops::RangeBounds;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage for Raft logs and vote state.
#[derive(Clone)]
pub struct LogStorage {
    inner: Arc<RwLock<LogStorageInner>>,
}

impl LogStorage {
    /// Create or open log storage in the given directory.
    pub fn open(dir: PathBuf) -> Result<Self, std::io::Error> {
        fs::create_dir_all(&dir)?;

        let mut inner = LogStorageInner::new(Some(dir));
        inner.initialize()?;

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    /// Create volatile storage.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogStorageInner::new(None))),
        }
    }
}

/// Implementation of OpenRaft's log reader interface.
impl RaftLogReader<TypeConfig> for LogStorage {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug>(
        &mut self,
        range: RB,
    ) -> Result<Vec<KvEntry>, KvStorageError> {
        let inner = self.inner.read().await;
        let entries: Vec<KvEntry> = inner.logs.range(range).map(|(_, e)| e.clone()).collect();
        Ok(entries)
    }
}

/// Implementation of OpenRaft's log storage interface.
impl RaftLogStorage<TypeConfig> for LogStorage {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, KvStorageError> {
        let inner = self.inner.read().await;

        let last_purged_log_id = inner.last_purged_log_id;
        // If no logs but we have a purged log id, use that
        let last_log_id = inner
            .logs
            .values()
            .last()
            .map(|e| e.log_id)
            .or(last_purged_log_id);

        Ok(LogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn save_committed(&mut self, committed: Option<KvLogId>) -> Result<(), KvStorageError> {
        let mut inner = self.inner.write().await;
        inner.committed = committed;
        inner
            .save_meta()
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<KvLogId>, KvStorageError> {
        let inner = self.inner.read().await;
        Ok(inner.committed)
    }

    async fn save_vote(&mut self, vote: &KvVote) -> Result<(), KvStorageError> {
        let mut inner = self.inner.write().await;
        inner
            .save_vote_to_disk(vote)
            .map_err(|e| StorageIOError::write_vote(&e))?;
        inner.vote = Some(*vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<KvVote>, KvStorageError> {
        let inner = self.inner.read().await;
        Ok(inner.vote)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), KvStorageError>
    where
        I: IntoIterator<Item = KvEntry>,
    {
        let mut inner = self.inner.write().await;

        let entries: Vec<KvEntry> = entries.into_iter().collect();
        inner
            .append_entries(entries)
            .map_err(|e| StorageIOError::write_logs(&e))?;

        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: KvLogId) -> Result<(), KvStorageError> {
        let mut inner = self.inner.write().await;
        inner
            .truncate_entries(log_id)
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn purge(&mut self, log_id: KvLogId) -> Result<(), KvStorageError> {
        let mut inner = self.inner.write().await;
        inner
            .purge_entries(log_id)
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openraft::{CommittedLeaderId, Vote};
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper to create a log ID for testing.
    fn test_log_id(term: u64, index: u64) -> KvLogId {
        KvLogId::new(CommittedLeaderId::new(term, 0), index)
    }

    /// Helper to create test entries.
    fn test_entries(term: u64, range: std::ops::RangeInclusive<u64>) -> Vec<KvEntry> {
        range
            .map(|i| KvEntry {
                log_id: test_log_id(term, i),
                payload: openraft::EntryPayload::Blank,
            })
            .collect()
    }

    /// Helper to append entries directly (bypasses callback).
    async fn append_test_entries(storage: &LogStorage, entries: Vec<KvEntry>) {
        let mut inner = storage.inner.write().await;
        inner
            .append_entries(entries)
            .expect("append should succeed");
    }

    #[tokio::test]
    async fn in_memory_storage_reads_back_entries() {
        let mut storage = LogStorage::in_memory();
        append_test_entries(&storage, test_entries(1, 1..=10)).await;

        let read_entries = storage
            .try_get_log_entries(3..=5)
            .await
            .expect("read entries");
        assert_eq!(read_entries.len(), 3);

        let state = storage.get_log_state().await.expect("log state");
        assert_eq!(state.last_log_id, Some(test_log_id(1, 10)));
    }

    #[tokio::test]
    async fn purge_survives_reopen() {
        let temp_dir = TempDir::new().expect("create temp dir");
        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            append_test_entries(&storage, test_entries(1, 1..=20)).await;
            storage.purge(test_log_id(1, 15)).await.expect("purge");

            let state = storage.get_log_state().await.expect("log state");
            assert_eq!(state.last_purged_log_id, Some(test_log_id(1, 15)));
        }

        let mut storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen");
        assert!(
            storage
                .try_get_log_entries(1..=15)
                .await
                .expect("read entries")
                .is_empty()
        );
        assert_eq!(
            storage
                .try_get_log_entries(16..=20)
                .await
                .expect("read entries")
                .len(),
            5
        );
    }

    #[tokio::test]
    async fn truncate_survives_reopen() {
        let temp_dir = TempDir::new().expect("create temp dir");
        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            append_test_entries(&storage, test_entries(1, 1..=100)).await;
            storage
                .truncate(test_log_id(1, 50))
                .await
                .expect("truncate");
            append_test_entries(&storage, test_entries(2, 50..=52)).await;
        }

        let mut storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen");
        let read_entries = storage
            .try_get_log_entries(1..)
            .await
            .expect("read entries");
        assert_eq!(read_entries.len(), 52);
        assert_eq!(read_entries[51].log_id, test_log_id(2, 52));
    }

    #[tokio::test]
    async fn torn_tail_is_dropped_on_open() {
        let temp_dir = TempDir::new().expect("create temp dir");
        {
            let storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            append_test_entries(&storage, test_entries(1, 1..=3)).await;
        }
        {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(temp_dir.path().join("log.ndjson"))
                .expect("open log");
            write!(file, "{{\"log_id\":").expect("write torn entry");
        }

        let mut storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen");
        let read_entries = storage
            .try_get_log_entries(1..)
            .await
            .expect("read entries");
        assert_eq!(read_entries.len(), 3);
    }

    #[tokio::test]
    async fn vote_and_committed_persist() {
        let temp_dir = TempDir::new().expect("create temp dir");

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            storage.save_vote(&Vote::new(5, 3)).await.expect("save vote");
            storage
                .save_committed(Some(test_log_id(5, 7)))
                .await
                .expect("save committed");
        }

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen storage");
            let vote = storage
                .read_vote()
                .await
                .expect("read vote")
                .expect("vote should exist");
            assert_eq!(vote.leader_id().term, 5);
            assert_eq!(vote.leader_id().node_id, 3);

            let committed = storage.read_committed().await.expect("read committed");
            assert_eq!(committed, Some(test_log_id(5, 7)));
        }
    }
}
