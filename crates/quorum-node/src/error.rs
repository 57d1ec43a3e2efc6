//! # error
//!
//! why: one error type for everything a replica handle can refuse
//! relations: wraps quorum-core's RaftError and quorum-storage's StorageError;
//! returned by replica.rs, turned into TransportError by network.rs
//! what: NodeError

use quorum_core::RaftError;
use quorum_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Raft(#[from] RaftError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
