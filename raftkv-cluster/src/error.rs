//! Error types for key-value cluster operations.

use crate::types::KvNodeId;
use openraft::BasicNode;
use std::time::Duration;
use thiserror::Error;

/// Result type for key-value cluster operations.
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Type alias for OpenRaft Raft errors.
pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<KvNodeId, E>;

/// Type alias for OpenRaft RPC errors.
pub type RPCError<E = openraft::error::Infallible> =
    openraft::error::RPCError<KvNodeId, BasicNode, RaftError<E>>;

/// Type alias for client write errors.
pub type ClientWriteError = openraft::error::ClientWriteError<KvNodeId, BasicNode>;

/// Type alias for initialize errors.
pub type InitializeError = openraft::error::InitializeError<KvNodeId, BasicNode>;

/// Errors that can occur in key-value cluster operations.
///
/// Client-path variants are translated to HTTP status codes at the router
/// boundary. [`KvError::Fatal`] is never sent to a client as a regular
/// failure: it means the replica can no longer be trusted.
#[derive(Debug, Error)]
pub enum KvError {
    /// A command payload could not be decoded.
    #[error("Invalid command: {0}")]
    Decode(String),

    /// A required request parameter was not supplied.
    #[error("missing {0}")]
    MissingParameter(&'static str),

    /// A request parameter was present but unusable.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A request body could not be parsed.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// A request body exceeded the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Maximum accepted body size.
        limit: usize,
    },

    /// The requested key does not exist on this replica.
    #[error("key not found: {0}")]
    NotFound(String),

    /// This node does not know who the current leader is.
    #[error("leader unknown")]
    LeaderUnknown,

    /// A forwarded write reached a node that is not the leader.
    #[error("Not the leader, leader is {leader:?}")]
    NotLeader {
        /// The leader this node currently believes in, if any.
        leader: Option<String>,
    },

    /// Forwarding a request to the leader failed.
    #[error("Leader {leader} unavailable: {cause}")]
    UpstreamUnavailable {
        /// Client address of the leader.
        leader: String,
        /// Transport failure description.
        cause: String,
    },

    /// The commit did not confirm within its bound.
    ///
    /// The command may still commit cluster-side.
    #[error("Commit not confirmed within {0:?}")]
    CommitTimeout(Duration),

    /// The consensus engine rejected or failed the commit.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// The node already has a cluster configuration.
    #[error("Cluster already bootstrapped: {0}")]
    AlreadyBootstrapped(String),

    /// A membership change was rejected.
    #[error("Membership change failed: {0}")]
    Membership(String),

    /// Apply-time corruption: the replica must stop serving.
    #[error("Replica is unsafe to continue: {0}")]
    Fatal(String),

    /// Raft consensus error.
    #[error("Raft error: {0}")]
    Raft(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            KvError::Decode(_) => "INVALID_COMMAND",
            KvError::MissingParameter(_) => "MISSING_PARAMETER",
            KvError::InvalidParameter { .. } => "INVALID_PARAMETER",
            KvError::MalformedBody(_) => "MALFORMED_BODY",
            KvError::BodyTooLarge { .. } => "BODY_TOO_LARGE",
            KvError::NotFound(_) => "NOT_FOUND",
            KvError::LeaderUnknown => "LEADER_UNKNOWN",
            KvError::NotLeader { .. } => "NOT_LEADER",
            KvError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            KvError::CommitTimeout(_) => "COMMIT_TIMEOUT",
            KvError::Commit(_) => "COMMIT_FAILED",
            KvError::AlreadyBootstrapped(_) => "ALREADY_BOOTSTRAPPED",
            KvError::Membership(_) => "MEMBERSHIP_FAILED",
            KvError::Fatal(_) => "REPLICA_FATAL",
            KvError::Raft(_) => "RAFT_ERROR",
            KvError::Serialization(_) => "SERIALIZATION_ERROR",
            KvError::Config(_) => "CONFIG_ERROR",
            KvError::Http(_) => "HTTP_ERROR",
            KvError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}
