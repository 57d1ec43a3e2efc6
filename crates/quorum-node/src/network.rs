//! # network
//!
//! why: run a whole cluster inside one process, with partitions and lossy
//! links on demand, for tests and simulations
//! relations: implements transport.rs by calling other Replica handles directly
//! what: LocalNetwork registry with per-node connectivity, LocalEndpoint transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorum_core::{AppendEntriesRequest, AppendEntriesResponse, NodeId, VoteRequest, VoteResponse};
use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::debug;

use crate::{NodeError, Replica, Transport, TransportError};

/// Chance that a request, or its reply, is lost on an unreliable network
const DROP_PROBABILITY: f64 = 0.1;

/// Upper bound of the extra delivery delay on an unreliable network
const MAX_DELAY_MS: u64 = 27;

struct Registry {
    replicas: Vec<Option<Replica>>,
    connected: Vec<bool>,
}

/// In-process network connecting a fixed number of replicas.
///
/// A node that is disconnected can neither send nor receive. Disconnecting
/// does not stop the node, so an isolated leader keeps believing it leads.
#[derive(Clone)]
pub struct LocalNetwork {
    size: usize,
    registry: Arc<RwLock<Registry>>,
    unreliable: Arc<AtomicBool>,
}

impl LocalNetwork {
    /// All nodes start connected but unregistered
    pub fn new(size: usize) -> Self {
        Self {
            size,
            registry: Arc::new(RwLock::new(Registry {
                replicas: vec![None; size],
                connected: vec![true; size],
            })),
            unreliable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.size
    }

    /// Transport for the replica at `id`
    pub fn endpoint(&self, id: NodeId) -> Arc<dyn Transport> {
        Arc::new(LocalEndpoint {
            id,
            network: self.clone(),
        })
    }

    /// Make `replica` reachable at its id, replacing any previous incarnation
    pub async fn register(&self, replica: Replica) {
        let mut registry = self.registry.write().await;
        if let Some(slot) = registry.replicas.get_mut(replica.id()) {
            *slot = Some(replica);
        }
    }

    /// Forget the replica at `id`; calls to it fail until a new one registers
    pub async fn remove(&self, id: NodeId) -> Option<Replica> {
        let mut registry = self.registry.write().await;
        registry.replicas.get_mut(id).and_then(Option::take)
    }

    pub async fn connect(&self, id: NodeId) {
        self.set_connected(id, true).await;
    }

    pub async fn disconnect(&self, id: NodeId) {
        self.set_connected(id, false).await;
    }

    pub async fn is_connected(&self, id: NodeId) -> bool {
        let registry = self.registry.read().await;
        registry.connected.get(id).copied().unwrap_or(false)
    }

    /// Drop and delay messages at random from now on
    pub fn set_unreliable(&self, unreliable: bool) {
        self.unreliable.store(unreliable, Ordering::SeqCst);
    }

    async fn set_connected(&self, id: NodeId, connected: bool) {
        let mut registry = self.registry.write().await;
        if let Some(flag) = registry.connected.get_mut(id) {
            *flag = connected;
            debug!(node = id, connected, "network link changed");
        }
    }

    async fn linked(&self, from: NodeId, to: NodeId) -> bool {
        let registry = self.registry.read().await;
        let up = |id: NodeId| registry.connected.get(id).copied().unwrap_or(false);
        up(from) && up(to)
    }

    /// The live replica `from` may talk to at `to`
    async fn route(&self, from: NodeId, to: NodeId) -> Result<Replica, TransportError> {
        if !self.linked(from, to).await {
            return Err(TransportError::Unreachable(to));
        }
        let registry = self.registry.read().await;
        match registry.replicas.get(to) {
            Some(Some(replica)) if !replica.killed() => Ok(replica.clone()),
            _ => Err(TransportError::Unreachable(to)),
        }
    }

    /// Apply the unreliable-network delay and loss to one hop
    async fn hop(&self, peer: NodeId) -> Result<(), TransportError> {
        if !self.unreliable.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (delay, lost) = roll_dice();
        sleep(delay).await;
        if lost {
            return Err(TransportError::Dropped(peer));
        }
        Ok(())
    }

    async fn deliver<T>(&self, from: NodeId, to: NodeId, reply: T) -> Result<T, TransportError> {
        self.hop(to).await?;
        // a reply is lost if either end went away while the call was running
        if !self.linked(to, from).await {
            return Err(TransportError::Unreachable(to));
        }
        Ok(reply)
    }
}

fn roll_dice() -> (Duration, bool) {
    let mut rng = rand::thread_rng();
    let delay = Duration::from_millis(rng.gen_range(0..MAX_DELAY_MS));
    (delay, rng.gen_bool(DROP_PROBABILITY))
}

/// One replica's view of a LocalNetwork
struct LocalEndpoint {
    id: NodeId,
    network: LocalNetwork,
}

fn remote_failure(peer: NodeId) -> impl FnOnce(NodeError) -> TransportError {
    move |err| TransportError::Remote {
        peer,
        reason: err.to_string(),
    }
}

#[async_trait]
impl Transport for LocalEndpoint {
    fn cluster_size(&self) -> usize {
        self.network.size
    }

    async fn request_vote(&self, target: NodeId, request: VoteRequest) -> Result<VoteResponse, TransportError> {
        self.network.hop(target).await?;
        let replica = self.network.route(self.id, target).await?;
        let response = replica
            .handle_request_vote(request)
            .await
            .map_err(remote_failure(target))?;
        self.network.deliver(self.id, target, response).await
    }

    async fn append_entries(
        &self,
        target: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        self.network.hop(target).await?;
        let replica = self.network.route(self.id, target).await?;
        let response = replica
            .handle_append_entries(request)
            .await
            .map_err(remote_failure(target))?;
        self.network.deliver(self.id, target, response).await
    }
}
