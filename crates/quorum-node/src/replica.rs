//! # replica
//!
//! why: run one raft peer: own its state behind a single lock, persist before
//! anything leaves the node, and expose the client and rpc entry points
//! relations: wraps quorum-core's RaftNode and a quorum-storage Storage; spawns
//! the loops in election.rs and replication.rs; called by transports
//! what: Replica handle, Shared/Core internals, get_state/start/kill, rpc handlers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quorum_core::{
    AppendEntriesRequest, AppendEntriesResponse, ApplyMsg, NodeId, NodeStatus, Proposal, RaftConfig, RaftNode,
    VoteRequest, VoteResponse,
};
use quorum_storage::{Storage, StorageError};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::{election, replication, NodeError, Transport};

/// Everything guarded by the replica's one lock
pub(crate) struct Core {
    pub(crate) node: RaftNode,
    storage: Box<dyn Storage>,
}

impl Core {
    /// Run `f` against the state machine and log any role or term change it caused
    pub(crate) fn step<R>(&mut self, f: impl FnOnce(&mut RaftNode) -> R) -> R {
        let (state, term) = (self.node.state, self.node.current_term);
        let out = f(&mut self.node);

        if self.node.state != state {
            info!(
                node = self.node.id,
                term = self.node.current_term,
                from = ?state,
                to = ?self.node.state,
                "role changed"
            );
        } else if self.node.current_term != term {
            debug!(node = self.node.id, term = self.node.current_term, "adopted newer term");
        }
        out
    }

    /// Flush term, vote and log if they changed since the last flush.
    /// Has to succeed before a reply or request reflecting the change is sent.
    pub(crate) fn persist(&mut self) -> Result<(), StorageError> {
        if !self.node.take_dirty() {
            return Ok(());
        }
        if let Err(err) = self.storage.save_state(&self.node.hard_state()) {
            self.node.mark_dirty();
            error!(
                node = self.node.id,
                term = self.node.current_term,
                error = %err,
                "failed to persist raft state"
            );
            return Err(err);
        }
        Ok(())
    }
}

/// State shared between the handle and the background loops
pub(crate) struct Shared {
    pub(crate) id: NodeId,
    pub(crate) cluster_size: usize,
    pub(crate) config: RaftConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) apply_tx: mpsc::Sender<ApplyMsg>,
    core: Mutex<Core>,
    dead: AtomicBool,
}

impl Shared {
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().await
    }

    pub(crate) fn killed(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub(crate) fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.cluster_size).filter(move |p| *p != self.id)
    }
}

/// Handle to a running replica. Cheap to clone; all clones drive the same peer.
#[derive(Clone)]
pub struct Replica {
    shared: Arc<Shared>,
}

impl Replica {
    /// Restore persisted state, then start the election ticker, heartbeat and
    /// replication loops on the current tokio runtime.
    ///
    /// Committed commands are delivered on `apply_tx` in log order; a full
    /// channel holds back further applies until the service catches up.
    /// A blob in `storage` that does not decode is an error; the replica does
    /// not start on empty state in that case.
    pub fn spawn(
        id: NodeId,
        storage: impl Storage + 'static,
        transport: Arc<dyn Transport>,
        config: RaftConfig,
        apply_tx: mpsc::Sender<ApplyMsg>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let cluster_size = transport.cluster_size();
        let mut node = RaftNode::new(id, cluster_size)?;

        if let Some(hard) = storage.load_state()? {
            info!(
                node = id,
                term = hard.current_term,
                voted_for = ?hard.voted_for,
                log_length = hard.log.len(),
                "restored persisted state"
            );
            node.restore(hard);
        }

        let shared = Arc::new(Shared {
            id,
            cluster_size,
            config,
            transport,
            apply_tx,
            core: Mutex::new(Core {
                node,
                storage: Box::new(storage),
            }),
            dead: AtomicBool::new(false),
        });

        tokio::spawn(election::run_ticker(Arc::clone(&shared)));
        tokio::spawn(replication::run_heartbeats(Arc::clone(&shared)));
        tokio::spawn(replication::run_replication(Arc::clone(&shared)));

        info!(node = id, cluster_size, "replica started");
        Ok(Self { shared })
    }

    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    /// Current term and whether this replica believes it is the leader
    pub async fn get_state(&self) -> (u64, bool) {
        let core = self.shared.lock().await;
        (core.node.current_term, core.node.is_leader())
    }

    pub async fn status(&self) -> NodeStatus {
        self.shared.lock().await.node.status()
    }

    /// Propose a command. Returns where it will land if it ever commits;
    /// commitment is only observable on the apply channel.
    pub async fn start(&self, command: Vec<u8>) -> Result<Proposal, NodeError> {
        let mut core = self.shared.lock().await;
        let proposal = core.node.start(command)?;

        if let Err(err) = core.persist() {
            // never replicate an entry this node could forget
            core.node.log.truncate_from(proposal.index);
            return Err(err.into());
        }

        debug!(
            node = self.shared.id,
            index = proposal.index,
            term = proposal.term,
            "accepted command"
        );
        Ok(proposal)
    }

    /// Stop the background loops. Idempotent; in-flight handlers may still finish.
    pub fn kill(&self) {
        if !self.shared.dead.swap(true, Ordering::SeqCst) {
            info!(node = self.shared.id, "replica killed");
        }
    }

    pub fn killed(&self) -> bool {
        self.shared.killed()
    }

    // -- inbound rpc --

    pub async fn handle_request_vote(&self, request: VoteRequest) -> Result<VoteResponse, NodeError> {
        let mut core = self.shared.lock().await;
        let response = core.step(|node| node.handle_vote_request(&request));
        core.persist()?;

        debug!(
            node = self.shared.id,
            candidate = request.candidate_id,
            term = request.term,
            granted = response.vote_granted,
            "handled vote request"
        );
        Ok(response)
    }

    pub async fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, NodeError> {
        let leader = request.leader_id;
        let carried = request.entries.len();

        let mut core = self.shared.lock().await;
        let response = core.step(|node| node.handle_append_entries(request));
        core.persist()?;

        if carried > 0 || !response.success {
            debug!(
                node = self.shared.id,
                leader,
                entries = carried,
                success = response.success,
                last_log_index = ?response.last_log_index,
                "handled append entries"
            );
        }
        Ok(response)
    }

    // -- snapshot hooks --

    /// Snapshots are not implemented; any offered snapshot is accepted and ignored
    pub fn cond_install_snapshot(&self, last_included_term: u64, last_included_index: u64, snapshot: &[u8]) -> bool {
        debug!(
            node = self.shared.id,
            last_included_term,
            last_included_index,
            bytes = snapshot.len(),
            "snapshot offered"
        );
        true
    }

    /// Log compaction request from the service; currently a no-op
    pub fn snapshot(&self, index: u64, snapshot: &[u8]) {
        debug!(node = self.shared.id, index, bytes = snapshot.len(), "snapshot ignored");
    }
}
