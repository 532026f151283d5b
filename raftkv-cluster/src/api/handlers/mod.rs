//! Endpoint handlers.

pub mod cluster;
pub mod kv;
