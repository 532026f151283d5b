//! Raft state machine for the replicated key-value map.
//!
//! The state machine is the core of the cluster's replicated state. It:
//! - Receives committed log entries (encoded commands)
//! - Applies them deterministically, in log order
//! - Produces and restores point-in-time snapshots
//! - Raises a fatal signal when a committed entry cannot be interpreted
//!
//! ## Module Structure
//!
//! - `types`: Apply results and the stored snapshot
//! - `state`: The replicated KvState
//! - `apply`: Command application logic
//! - `traits`: OpenRaft trait implementations

mod apply;
mod state;
mod traits;
mod types;

pub use state::KvState;
pub use types::{ApplyResult, KvResponse, StoredSnapshot};

use crate::error::{KvError, KvResult};
use crate::state::snapshot::{KvSnapshot, read_snapshot};
use crate::types::KvSnapshotMeta;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use tokio::sync::{RwLock, watch};

const SNAPSHOT_FILE: &str = "snapshot.json";

/// The Raft state machine.
///
/// Holds the replicated key-value map behind a reader-writer lock: applies
/// and restores take it exclusively, reads and snapshots share it. A read
/// therefore observes either all of a command or none of it.
#[derive(Debug)]
pub struct KvStateMachine {
    /// The replicated state.
    state: RwLock<KvState>,
    /// Snapshot index counter.
    snapshot_idx: AtomicU64,
    /// Current snapshot.
    current_snapshot: RwLock<Option<StoredSnapshot>>,
    /// First apply-time corruption seen, if any.
    fatal: watch::Sender<Option<String>>,
    /// Where the latest snapshot is kept; `None` keeps it in memory only.
    snapshot_dir: Option<PathBuf>,
}

/// On-disk form of the latest snapshot.
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    meta: KvSnapshotMeta,
    data: String,
}

impl Default for KvStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStateMachine {
    /// Create an empty, memory-only state machine.
    pub fn new() -> Self {
        let (fatal, _) = watch::channel(None);
        Self {
            state: RwLock::new(KvState::default()),
            snapshot_idx: AtomicU64::new(0),
            current_snapshot: RwLock::new(None),
            fatal,
            snapshot_dir: None,
        }
    }

    /// Open a state machine whose snapshots live in `dir`.
    ///
    /// If a snapshot was saved there before, the state starts from it.
    pub fn open(dir: impl Into<PathBuf>) -> KvResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut sm = Self::new();
        if let Some(stored) = load_snapshot_file(&dir)? {
            let data = read_snapshot(stored.data.as_slice())?;
            tracing::info!(
                keys = data.len(),
                snapshot_id = %stored.meta.snapshot_id,
                "restored state machine from snapshot"
            );
            let state = sm.state.get_mut();
            state.data = data;
            state.last_applied_log = stored.meta.last_log_id;
            state.last_membership = stored.meta.last_membership.clone();
            *sm.current_snapshot.get_mut() = Some(stored);
        }
        sm.snapshot_dir = Some(dir);
        Ok(sm)
    }

    /// Apply one committed entry.
    ///
    /// Once a fatal result has been produced, every later call returns
    /// `Fatal` too and the state stays frozen.
    pub async fn apply_entry(&self, entry: &[u8]) -> ApplyResult {
        if let Some(reason) = self.fatal_reason() {
            return ApplyResult::Fatal(reason);
        }

        let mut state = self.state.write().await;
        let result = apply::apply_payload(&mut state, entry);
        if let ApplyResult::Fatal(reason) = &result {
            self.raise_fatal(reason.clone());
        }
        result
    }

    /// Current value of `key` on this replica.
    ///
    /// Reads are local: a follower may lag behind the leader.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.state.read().await.data.get(key).cloned()
    }

    /// Number of keys on this replica.
    pub async fn len(&self) -> usize {
        self.state.read().await.data.len()
    }

    /// Whether this replica holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.data.is_empty()
    }

    /// Capture a point-in-time copy of the key-value map.
    pub async fn snapshot(&self) -> KvSnapshot {
        KvSnapshot::new(self.state.read().await.data.clone())
    }

    /// Replace the whole key-value map with a serialized snapshot.
    ///
    /// The snapshot is parsed completely before the state is touched, so a
    /// malformed snapshot leaves the previous state in place.
    pub async fn restore<R: Read>(&self, reader: R) -> KvResult<()> {
        let data = read_snapshot(reader)?;
        let mut state = self.state.write().await;
        state.data = data;
        Ok(())
    }

    /// Reason for the first fatal apply, if one happened.
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.borrow().clone()
    }

    /// Watch for the fatal signal.
    pub fn subscribe_fatal(&self) -> watch::Receiver<Option<String>> {
        self.fatal.subscribe()
    }

    /// Resolve with the fatal reason once the replica has stopped.
    pub async fn wait_fatal(&self) -> String {
        let mut rx = self.fatal.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Fail with [`KvError::Fatal`] if the replica has stopped.
    pub fn ensure_healthy(&self) -> KvResult<()> {
        match self.fatal_reason() {
            Some(reason) => Err(KvError::Fatal(reason)),
            None => Ok(()),
        }
    }

    /// Record the first fatal reason; later ones are dropped.
    pub(crate) fn raise_fatal(&self, reason: String) {
        let raised = self.fatal.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.clone());
                true
            } else {
                false
            }
        });
        if raised {
            tracing::error!(%reason, "state machine hit a committed entry it cannot apply");
        }
    }

    fn save_snapshot_file(&self, stored: &StoredSnapshot) -> std::io::Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };

        let path = dir.join(SNAPSHOT_FILE);
        let temp_path = dir.join(format!("{}.tmp", SNAPSHOT_FILE));

        let file = SnapshotFile {
            meta: stored.meta.clone(),
            data: String::from_utf8(stored.data.clone())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        };

        let out = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(out);
        serde_json::to_writer(&mut writer, &file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

fn load_snapshot_file(dir: &Path) -> KvResult<Option<StoredSnapshot>> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let reader = BufReader::new(File::open(&path)?);
    let file: SnapshotFile = serde_json::from_reader(reader)?;
    Ok(Some(StoredSnapshot {
        meta: file.meta,
        data: file.data.into_bytes(),
    }))
}
