//! Persistence operations: vote, metadata and the log file.
//!
//! Small state files are replaced atomically (temp file + rename). The log
//! is newline-delimited JSON, appended in place and rewritten atomically on
//! truncate and purge.

use crate::types::{KvEntry, KvLogId, KvVote};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write as IoWrite};
use std::path::Path;

use super::inner::LogStorageInner;

const VOTE_FILE: &str = "vote.json";
const META_FILE: &str = "meta.json";
const LOG_FILE: &str = "log.ndjson";

/// Persisted log state metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistedLogMeta {
    pub last_purged_log_id: Option<KvLogId>,
    pub committed: Option<KvLogId>,
}

/// Operations for persistence (vote, metadata, log file).
pub trait PersistenceOps {
    /// Load vote from disk.
    fn load_vote(&mut self) -> Result<(), std::io::Error>;

    /// Save vote to disk.
    fn save_vote_to_disk(&self, vote: &KvVote) -> Result<(), std::io::Error>;

    /// Load metadata from disk.
    fn load_meta(&mut self) -> Result<(), std::io::Error>;

    /// Save metadata to disk.
    fn save_meta(&self) -> Result<(), std::io::Error>;

    /// Load log entries from disk and open the log for appending.
    fn load_log(&mut self) -> Result<(), std::io::Error>;

    /// Replace the log file with the in-memory entries.
    fn rewrite_log(&mut self) -> Result<(), std::io::Error>;
}

impl PersistenceOps for LogStorageInner {
    fn load_vote(&mut self) -> Result<(), std::io::Error> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        self.vote = read_json(&dir.join(VOTE_FILE))?;
        Ok(())
    }

    fn save_vote_to_disk(&self, vote: &KvVote) -> Result<(), std::io::Error> {
        match &self.dir {
            Some(dir) => write_json_atomically(dir, VOTE_FILE, vote),
            None => Ok(()),
        }
    }

    fn load_meta(&mut self) -> Result<(), std::io::Error> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let meta: PersistedLogMeta = read_json(&dir.join(META_FILE))?.unwrap_or_default();
        self.last_purged_log_id = meta.last_purged_log_id;
        self.committed = meta.committed;
        Ok(())
    }

    fn save_meta(&self) -> Result<(), std::io::Error> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let meta = PersistedLogMeta {
            last_purged_log_id: self.last_purged_log_id,
            committed: self.committed,
        };
        write_json_atomically(dir, META_FILE, &meta)
    }

    fn load_log(&mut self) -> Result<(), std::io::Error> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let path = dir.join(LOG_FILE);

        let mut torn_tail = false;
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
            let last = lines.len().saturating_sub(1);

            for (i, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<KvEntry>(line) {
                    Ok(entry) => {
                        self.logs.insert(entry.log_id.index, entry);
                    }
                    // A crash mid-append leaves a partial last line
                    Err(e) if i == last => {
                        tracing::warn!(error = %e, "dropping torn entry at end of raft log");
                        torn_tail = true;
                    }
                    Err(e) => {
                        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e));
                    }
                }
            }
        }

        if let Some(purged) = self.last_purged_log_id {
            self.logs = self.logs.split_off(&(purged.index + 1));
        }

        if torn_tail {
            return self.rewrite_log();
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.log_writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn rewrite_log(&mut self) -> Result<(), std::io::Error> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let path = dir.join(LOG_FILE);
        let temp_path = dir.join(format!("{}.tmp", LOG_FILE));

        // Release the append handle before the file is replaced
        self.log_writer = None;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        for entry in self.logs.values() {
            let json = serde_json::to_string(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, &path)?;

        let file = OpenOptions::new().append(true).open(&path)?;
        self.log_writer = Some(BufWriter::new(file));
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, std::io::Error> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_json_atomically<T: Serialize>(
    dir: &Path,
    name: &str,
    value: &T,
) -> Result<(), std::io::Error> {
    let path = dir.join(name);
    let temp_path = dir.join(format!("{}.tmp", name));

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    fs::rename(&temp_path, &path)?;
    Ok(())
}
