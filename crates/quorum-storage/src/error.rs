//! # error
//!
//! why: tell callers whether persistence failed on i/o, on encoding, or on a
//! blob that can no longer be trusted
//! relations: returned by the Storage trait and codec.rs, wrapped by quorum-node
//! what: StorageError

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode raft state: {0}")]
    Encode(#[source] serde_json::Error),

    /// A blob exists but cannot be decoded; the node must not start on it
    #[error("persisted raft state is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}
