//! Command application logic.

use crate::command::KvCommand;

use super::state::KvState;
use super::types::{ApplyResult, KvResponse};

/// Decode and apply one committed entry.
///
/// Decoding happens before any mutation, so a `Fatal` result leaves the state
/// untouched.
pub fn apply_payload(state: &mut KvState, payload: &[u8]) -> ApplyResult {
    match KvCommand::decode(payload) {
        Ok(cmd) => ApplyResult::Applied(apply_command(state, cmd)),
        Err(e) => ApplyResult::Fatal(e.to_string()),
    }
}

/// Apply a command to the key-value state.
pub fn apply_command(state: &mut KvState, cmd: KvCommand) -> KvResponse {
    match cmd {
        KvCommand::Set { key, value } => KvResponse {
            previous: state.data.insert(key, value),
        },
        KvCommand::Delete { key } => KvResponse {
            previous: state.data.remove(&key),
        },
    }
}
