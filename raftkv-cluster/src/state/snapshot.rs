//! Point-in-time snapshot handle.

use crate::error::{KvError, KvResult};
use std::collections::HashMap;
use std::io::{Read, Write};

/// A fully materialized copy of the key-value map.
///
/// Captured under the state machine's read lock, so it holds either the whole
/// effect of a command or none of it. Owned independently of the live state:
/// applies that happen after capture never show up here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvSnapshot {
    data: HashMap<String, String>,
}

impl KvSnapshot {
    pub(crate) fn new(data: HashMap<String, String>) -> Self {
        Self { data }
    }

    /// Write the serialized snapshot (a JSON object of key to value) to `sink`.
    pub fn persist<W: Write>(&self, mut sink: W) -> KvResult<()> {
        serde_json::to_writer(&mut sink, &self.data)?;
        sink.flush()?;
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> KvResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.persist(&mut buf)?;
        Ok(buf)
    }

    /// Value of `key` at capture time.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Number of keys captured.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Parse a serialized snapshot written by [`KvSnapshot::persist`].
pub(crate) fn read_snapshot<R: Read>(reader: R) -> KvResult<HashMap<String, String>> {
    serde_json::from_reader(reader).map_err(|e| KvError::Serialization(e.to_string()))
}
