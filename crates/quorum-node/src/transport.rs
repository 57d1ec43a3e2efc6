//! # transport
//!
//! why: keep the consensus loops independent of how rpcs travel
//! relations: called by election.rs and replication.rs, implemented by network.rs
//! and by embedders for real networks
//! what: Transport trait, TransportError

use async_trait::async_trait;
use quorum_core::{AppendEntriesRequest, AppendEntriesResponse, NodeId, VoteRequest, VoteResponse};
use thiserror::Error;

/// Why an outbound call produced no reply. Every variant is a soft failure:
/// the caller simply does not credit that peer this round.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(NodeId),

    #[error("message to or from peer {0} was lost")]
    Dropped(NodeId),

    #[error("peer {peer} failed to handle the call: {reason}")]
    Remote { peer: NodeId, reason: String },
}

/// Outbound RPC to the other members of a fixed, ordered peer list.
///
/// Implementations must always return eventually (a reply or an error);
/// the replica wraps no timeout of its own around these calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Number of peers in the cluster, the local node included
    fn cluster_size(&self) -> usize;

    async fn request_vote(&self, target: NodeId, request: VoteRequest) -> Result<VoteResponse, TransportError>;

    async fn append_entries(
        &self,
        target: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError>;
}
