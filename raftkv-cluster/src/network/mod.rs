//! Network layer for Raft RPC communication.
//!
//! Raft messages travel as JSON over plain HTTP/1. Each RPC is a `POST` to
//! the peer's raft address:
//!
//! - `/raft/append` - AppendEntries
//! - `/raft/vote` - RequestVote
//! - `/raft/snapshot` - InstallSnapshot (one chunk per request)
//!
//! The response body is the JSON form of `Result<Response, RaftError>`.

mod client;
mod server;

pub use client::{NetworkClient, NetworkConnection};
pub use server::RaftServer;

/// Path for AppendEntries.
pub const APPEND_PATH: &str = "/raft/append";
/// Path for RequestVote.
pub const VOTE_PATH: &str = "/raft/vote";
/// Path for InstallSnapshot.
pub const SNAPSHOT_PATH: &str = "/raft/snapshot";
