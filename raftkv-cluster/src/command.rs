//! Key-value commands - the mutations that go through Raft consensus.
//!
//! Commands are encoded into an opaque [`CommandPayload`] before they enter
//! the Raft log, so the consensus engine never interprets them. Every replica
//! decodes the same bytes and applies them in the same order.
//!
//! The wire form is a JSON object with an explicit operation tag:
//!
//! ```text
//! {"op":"set","key":"a","value":"1"}
//! {"op":"delete","key":"a"}
//! ```

use crate::error::{KvError, KvResult};
use serde::{Deserialize, Serialize};

/// A replicated mutation of the key-value state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum KvCommand {
    /// Insert or overwrite a key.
    Set {
        /// Key to write.
        key: String,
        /// New value.
        value: String,
    },

    /// Remove a key. Removing an absent key is a no-op.
    Delete {
        /// Key to remove.
        key: String,
    },
}

impl KvCommand {
    /// Build a `Set` command.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        KvCommand::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a `Delete` command.
    pub fn delete(key: impl Into<String>) -> Self {
        KvCommand::Delete { key: key.into() }
    }

    /// Get a human-readable name for this command type.
    pub fn name(&self) -> &'static str {
        match self {
            KvCommand::Set { .. } => "set",
            KvCommand::Delete { .. } => "delete",
        }
    }

    /// The key this command touches.
    pub fn key(&self) -> &str {
        match self {
            KvCommand::Set { key, .. } | KvCommand::Delete { key } => key,
        }
    }

    /// Encode this command into a log payload.
    pub fn encode(&self) -> KvResult<CommandPayload> {
        let bytes = serde_json::to_vec(self)?;
        Ok(CommandPayload(bytes))
    }

    /// Decode a command from raw log bytes.
    ///
    /// An unknown `op` tag, a missing field or malformed JSON is a
    /// [`KvError::Decode`].
    pub fn decode(bytes: &[u8]) -> KvResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| KvError::Decode(e.to_string()))
    }
}

/// Opaque encoded command as stored in the Raft log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandPayload(pub Vec<u8>);

impl CommandPayload {
    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the payload back into a command.
    pub fn decode(&self) -> KvResult<KvCommand> {
        KvCommand::decode(&self.0)
    }
}

impl From<Vec<u8>> for CommandPayload {
    fn from(bytes: Vec<u8>) -> Self {
        CommandPayload(bytes)
    }
}
