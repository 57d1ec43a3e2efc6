//! # quorum-core
//!
//! why: implement the raft consensus rules in pure, portable rust
//! relations: driven by quorum-node's async loops, persisted via quorum-storage
//! what: replica state machine, election tally, log management, rpc payloads

pub mod config;
pub mod election;
pub mod error;
pub mod log;
pub mod message;
pub mod node;

/// A peer's position in the cluster's ordered peer list
pub type NodeId = usize;

pub use config::RaftConfig;
pub use election::{quorum_size, ElectionOutcome, VoteTally};
pub use error::RaftError;
pub use log::{Log, LogEntry};
pub use message::{
    AppendEntriesRequest, AppendEntriesResponse, AppendProgress, ApplyMsg, VoteRequest, VoteResponse,
};
pub use node::{HardState, LeaderState, NodeState, NodeStatus, Proposal, RaftNode};
