//! # error
//!
//! why: one error type for everything the consensus core can refuse
//! relations: returned by node.rs and config.rs, wrapped by quorum-node
//! what: RaftError

use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Error)]
pub enum RaftError {
    /// The request needs a leader and this replica is not one
    #[error("not the leader (current term {term})")]
    NotLeader { term: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("node {id} is not a member of a {peers}-node cluster")]
    InvalidPeer { id: NodeId, peers: usize },
}
