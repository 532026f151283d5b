//! Replicated key-value state.

use crate::types::{KvLogId, KvStoredMembership};
use std::collections::HashMap;

/// The state every replica converges on.
///
/// Only the state machine mutates it: through applies in log order, or
/// wholesale through a snapshot restore.
#[derive(Debug, Default, Clone)]
pub struct KvState {
    /// Key to value.
    pub data: HashMap<String, String>,
    /// Last applied log ID.
    pub last_applied_log: Option<KvLogId>,
    /// Last membership configuration.
    pub last_membership: KvStoredMembership,
}
