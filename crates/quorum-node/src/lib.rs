//! # quorum-node
//!
//! why: drive quorum-core's state machine with real timers, concurrent rpcs
//! and durable storage
//! relations: depends on quorum-core for the raft rules and quorum-storage for
//! persistence; embedders plug in their own Transport
//! what: Replica handle, background election and replication loops, Transport
//! trait, in-process LocalNetwork

mod election;
pub mod error;
pub mod network;
pub mod replica;
mod replication;
pub mod transport;

pub use error::NodeError;
pub use network::LocalNetwork;
pub use replica::Replica;
pub use transport::{Transport, TransportError};

pub use quorum_core::{ApplyMsg, NodeId, NodeState, NodeStatus, Proposal, RaftConfig};
