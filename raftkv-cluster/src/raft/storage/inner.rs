//! Internal storage state and entry operations.

use crate::types::{KvEntry, KvLogId, KvVote};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write as IoWrite};
use std::path::PathBuf;

use super::persistence::PersistenceOps;

/// Inner storage state.
pub struct LogStorageInner {
    /// Directory for storage files; `None` keeps everything in memory.
    pub dir: Option<PathBuf>,
    /// In-memory log entries (for fast access).
    pub logs: BTreeMap<u64, KvEntry>,
    /// Last purged log ID.
    pub last_purged_log_id: Option<KvLogId>,
    /// Committed log ID.
    pub committed: Option<KvLogId>,
    /// Current vote state.
    pub vote: Option<KvVote>,
    /// Append handle on the log file.
    pub log_writer: Option<BufWriter<File>>,
}

impl LogStorageInner {
    /// Create a new inner storage state.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            logs: BTreeMap::new(),
            last_purged_log_id: None,
            committed: None,
            vote: None,
            log_writer: None,
        }
    }

    /// Initialize storage by loading existing data.
    pub fn initialize(&mut self) -> Result<(), std::io::Error> {
        self.load_vote()?;
        self.load_meta()?;
        self.load_log()?;
        Ok(())
    }

    /// Append entries to the log file and the in-memory map.
    pub fn append_entries(&mut self, entries: Vec<KvEntry>) -> Result<(), std::io::Error> {
        if entries.is_empty() {
            return Ok(());
        }

        if let Some(writer) = self.log_writer.as_mut() {
            for entry in &entries {
                let json = serde_json::to_string(entry)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(writer, "{}", json)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        for entry in entries {
            self.logs.insert(entry.log_id.index, entry);
        }
        Ok(())
    }

    /// Remove entries up to and including `log_id`.
    pub fn purge_entries(&mut self, log_id: KvLogId) -> Result<(), std::io::Error> {
        // Update metadata first
        self.last_purged_log_id = Some(log_id);
        self.save_meta()?;

        self.logs = self.logs.split_off(&(log_id.index + 1));
        self.rewrite_log()
    }

    /// Remove entries at and after `log_id`.
    pub fn truncate_entries(&mut self, log_id: KvLogId) -> Result<(), std::io::Error> {
        self.logs.split_off(&log_id.index);
        self.rewrite_log()
    }
}
