//! Raft state machine implementation.
//!
//! The state machine receives committed log entries (encoded `KvCommand`s) and
//! applies them to the key-value map. All nodes apply the same commands in the
//! same order, ensuring identical state on every replica.

mod machine;
mod snapshot;

pub use machine::{ApplyResult, KvResponse, KvState, KvStateMachine, StoredSnapshot};
pub use snapshot::KvSnapshot;
