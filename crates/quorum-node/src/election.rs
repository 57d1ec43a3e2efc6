//! # election
//!
//! why: turn silence from the leader into a campaign, and a campaign into a leader
//! relations: spawned by replica.rs; tallies through quorum-core's RaftNode,
//! sends votes over transport.rs, hands winners to replication.rs
//! what: randomized election ticker, concurrent vote fan-out with early decision

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use quorum_core::{ElectionOutcome, RaftConfig, RaftNode};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::replica::Shared;
use crate::replication;

/// Sleep a random interval in the election window, then campaign if no
/// leader has been heard from for the configured minimum timeout.
pub(crate) async fn run_ticker(shared: Arc<Shared>) {
    loop {
        sleep(election_sleep(&shared.config)).await;
        if shared.killed() {
            break;
        }

        let campaign = {
            let mut core = shared.lock().await;
            if core.node.election_due(Instant::now(), shared.config.election_timeout()) {
                core.step(RaftNode::become_candidate);
                Some(core.node.current_term)
            } else {
                None
            }
        };

        if let Some(term) = campaign {
            tokio::spawn(run_election(Arc::clone(&shared), term));
        }
    }
    debug!(node = shared.id, "election ticker stopped");
}

fn election_sleep(config: &RaftConfig) -> Duration {
    let ms = rand::thread_rng().gen_range(config.election_timeout_min..config.election_timeout_max);
    Duration::from_millis(ms)
}

/// Run one election opened from `term`. Replies are consumed as they
/// arrive; the first decisive one ends the election and drops the rest.
pub(crate) async fn run_election(shared: Arc<Shared>, term: u64) {
    let (request, mut outcome) = {
        let mut core = shared.lock().await;
        let Some(request) = core.step(|node| node.start_election(term)) else {
            return;
        };
        if core.persist().is_err() {
            // an unrecorded self-vote must not be offered to anyone
            core.step(|node| node.abandon_election(request.term));
            return;
        }
        let outcome = core.step(|node| node.settle_election(request.term));
        (request, outcome)
    };
    let election_term = request.term;
    info!(node = shared.id, term = election_term, "starting election");

    let mut replies: FuturesUnordered<_> = shared
        .peers()
        .map(|peer| {
            let transport = Arc::clone(&shared.transport);
            let request = request.clone();
            async move { (peer, transport.request_vote(peer, request).await) }
        })
        .collect();

    while outcome == ElectionOutcome::Pending {
        let Some((peer, result)) = replies.next().await else {
            break;
        };

        let mut core = shared.lock().await;
        outcome = match result {
            Ok(response) => core.step(|node| node.handle_vote_response(election_term, peer, &response)),
            Err(err) => {
                debug!(node = shared.id, peer, error = %err, "vote request failed");
                core.step(|node| node.handle_vote_failure(election_term, peer))
            }
        };
        if let Some(tally) = core.node.votes.as_ref() {
            debug!(
                node = shared.id,
                term = election_term,
                granted = tally.granted(),
                denied = tally.denied(),
                "vote tallied"
            );
        }
        // a reply may have carried a newer term
        if core.persist().is_err() {
            break;
        }
    }
    drop(replies);

    match outcome {
        ElectionOutcome::Won => {
            info!(node = shared.id, term = election_term, "won election");
            replication::broadcast_heartbeats(&shared).await;
        }
        ElectionOutcome::Lost => {
            info!(node = shared.id, term = election_term, "lost election");
        }
        ElectionOutcome::Pending => {
            let mut core = shared.lock().await;
            core.step(|node| node.abandon_election(election_term));
            debug!(node = shared.id, term = election_term, "election undecided, waiting for next timeout");
        }
        ElectionOutcome::Stale => {
            debug!(node = shared.id, term = election_term, "election superseded");
        }
    }
}
