//! # replication
//!
//! why: keep followers' logs in step with the leader and move committed
//! entries into the service
//! relations: spawned by replica.rs and election.rs; builds requests and folds
//! replies through quorum-core's RaftNode, sends over transport.rs
//! what: heartbeat loop, replication loop, per-peer append calls, commit and apply

use std::sync::Arc;

use quorum_core::{AppendEntriesRequest, NodeId};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::replica::Shared;

pub(crate) async fn run_heartbeats(shared: Arc<Shared>) {
    while !shared.killed() {
        broadcast_heartbeats(&shared).await;
        sleep(shared.config.heartbeat()).await;
    }
    debug!(node = shared.id, "heartbeat loop stopped");
}

/// Send an empty AppendEntries to every peer if we lead
pub(crate) async fn broadcast_heartbeats(shared: &Arc<Shared>) {
    let requests = shared.lock().await.node.heartbeat_requests();
    for (peer, request) in requests {
        send_append_entries(shared, peer, request);
    }
}

pub(crate) async fn run_replication(shared: Arc<Shared>) {
    while !shared.killed() {
        replicate(&shared).await;
        commit_and_apply(&shared).await;
        sleep(shared.config.replication()).await;
    }
    debug!(node = shared.id, "replication loop stopped");
}

async fn replicate(shared: &Arc<Shared>) {
    let requests = shared.lock().await.node.replication_requests();
    for (peer, request) in requests {
        debug!(
            node = shared.id,
            peer,
            prev_log_index = ?request.prev_log_index,
            entries = request.entries.len(),
            "replicating entries"
        );
        send_append_entries(shared, peer, request);
    }
}

/// Fire one AppendEntries and fold its reply back in on its own task, so a
/// slow peer never holds up the others.
fn send_append_entries(shared: &Arc<Shared>, peer: NodeId, request: AppendEntriesRequest) {
    let shared = Arc::clone(shared);
    let sent = request.progress();

    tokio::spawn(async move {
        let response = match shared.transport.append_entries(peer, request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(node = shared.id, peer, error = %err, "append entries failed");
                return;
            }
        };

        let mut core = shared.lock().await;
        if core.step(|node| node.handle_append_entries_response(peer, sent, &response)) {
            debug!(node = shared.id, commit_index = ?core.node.commit_index, "commit index advanced");
        }
        // a newer term from the reply must be on disk before we act on it
        if core.persist().is_err() {
            debug!(node = shared.id, peer, "deferred persisting term from append reply");
        }
    });
}

/// Recompute the commit index and deliver newly committed commands in order.
/// Delivery waits on the sink without holding the lock, so a slow consumer
/// slows down applying but never consensus.
async fn commit_and_apply(shared: &Arc<Shared>) {
    let ready = {
        let mut core = shared.lock().await;
        if core.node.advance_commit() {
            debug!(node = shared.id, commit_index = ?core.node.commit_index, "commit index advanced");
        }
        core.node.entries_to_apply()
    };

    for msg in ready {
        if shared.apply_tx.send(msg).await.is_err() {
            warn!(node = shared.id, "apply channel closed, committed entries dropped");
            break;
        }
    }
}
