//! # node
//!
//! why: define the raft replica state machine and every state transition
//! relations: uses message.rs for rpc types, log.rs for entries, election.rs for
//! vote counting; driven under a single lock by quorum-node
//! what: NodeState, RaftNode, rpc handlers, leader progress, commit and apply

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::election::{quorum_size, ElectionOutcome, VoteTally};
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, AppendProgress, ApplyMsg, VoteRequest, VoteResponse,
};
use crate::{Log, LogEntry, NodeId, RaftError};

/// The three possible states a Raft node can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Follower
    }
}

/// State that must survive a restart: flushed on every change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub log: Log,
}

/// Per-peer progress, only alive while leading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderState {
    /// next log index to send to each peer (optimistic)
    pub next_index: Vec<u64>,
    /// highest index known replicated on each peer (conservative)
    pub match_index: Vec<Option<u64>>,
}

/// Where a freshly accepted command will live if it commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub index: u64,
    pub term: u64,
}

/// Point-in-time view of a replica for embedders and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub state: NodeState,
    pub term: u64,
    pub log_length: u64,
    pub commit_index: Option<u64>,
    pub last_applied: Option<u64>,
}

/// A single Raft node in the cluster
#[derive(Debug)]
pub struct RaftNode {
    /// This node's position in the peer list
    pub id: NodeId,
    /// Number of peers, this node included
    pub cluster_size: usize,
    /// Current state (Follower, Candidate, or Leader)
    pub state: NodeState,
    /// Current term number
    pub current_term: u64,
    /// Node that received our vote in current term (if any)
    pub voted_for: Option<NodeId>,
    pub log: Log,
    /// Highest index known committed
    pub commit_index: Option<u64>,
    /// Highest index handed to the state machine
    pub last_applied: Option<u64>,
    /// Last evidence of a live leader (or of our own campaign)
    pub last_heartbeat: Instant,
    pub leader: Option<LeaderState>,
    pub votes: Option<VoteTally>,
    dirty: bool,
}

impl RaftNode {
    /// Create a new Raft node in Follower state
    pub fn new(id: NodeId, cluster_size: usize) -> Result<Self, RaftError> {
        if id >= cluster_size {
            return Err(RaftError::InvalidPeer { id, peers: cluster_size });
        }
        Ok(Self {
            id,
            cluster_size,
            state: NodeState::Follower,
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            commit_index: None,
            last_applied: None,
            last_heartbeat: Instant::now(),
            leader: None,
            votes: None,
            dirty: false,
        })
    }

    /// Load persisted state after a restart
    pub fn restore(&mut self, hard: HardState) {
        self.current_term = hard.current_term;
        self.voted_for = hard.voted_for;
        self.log = hard.log;
        self.dirty = false;
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            current_term: self.current_term,
            voted_for: self.voted_for,
            log: self.log.clone(),
        }
    }

    /// Whether term, vote or log changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Flag persistent state for another flush (e.g. after a failed write)
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn quorum_size(&self) -> usize {
        quorum_size(self.cluster_size)
    }

    /// Every peer except this node
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.cluster_size).filter(move |p| *p != self.id)
    }

    pub fn is_leader(&self) -> bool {
        self.state == NodeState::Leader
    }

    pub fn last_log_index(&self) -> Option<u64> {
        self.log.last_index()
    }

    pub fn last_log_term(&self) -> u64 {
        self.log.last_term()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            state: self.state,
            term: self.current_term,
            log_length: self.log.len() as u64,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
        }
    }

    // -- term and role transitions --

    /// Adopt `term` if it is newer than ours, reverting to follower.
    /// Returns true when the term advanced.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.voted_for = None;
        self.dirty = true;
        self.become_follower();
        true
    }

    pub fn become_follower(&mut self) {
        self.state = NodeState::Follower;
        self.leader = None;
        self.votes = None;
    }

    pub fn become_candidate(&mut self) {
        self.state = NodeState::Candidate;
        self.leader = None;
    }

    pub fn become_leader(&mut self) {
        self.state = NodeState::Leader;
        self.votes = None;
        let next = self.log.next_index();
        self.leader = Some(LeaderState {
            next_index: vec![next; self.cluster_size],
            match_index: vec![None; self.cluster_size],
        });
    }

    // -- election --

    /// No leader has been heard from for longer than `timeout`
    pub fn election_due(&self, now: Instant, timeout: Duration) -> bool {
        self.state != NodeState::Leader && now.saturating_duration_since(self.last_heartbeat) > timeout
    }

    /// Open an election for the term after `expected_term`.
    ///
    /// Does nothing unless we are still a candidate in `expected_term`, which
    /// filters out timer firings that raced with a role or term change.
    pub fn start_election(&mut self, expected_term: u64) -> Option<VoteRequest> {
        if self.state != NodeState::Candidate || self.current_term != expected_term {
            return None;
        }
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.dirty = true;
        self.last_heartbeat = Instant::now();
        self.votes = Some(VoteTally::new(self.cluster_size, self.id));

        Some(VoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.last_log_index(),
            last_log_term: self.last_log_term(),
        })
    }

    pub fn handle_vote_response(
        &mut self,
        election_term: u64,
        from: NodeId,
        response: &VoteResponse,
    ) -> ElectionOutcome {
        if self.observe_term(response.term) || !self.election_live(election_term) {
            return ElectionOutcome::Stale;
        }
        if response.term != election_term {
            return self.settle_election(election_term);
        }
        let outcome = match self.votes.as_mut() {
            Some(tally) => tally.record(from, response.vote_granted),
            None => return ElectionOutcome::Stale,
        };
        self.conclude(outcome)
    }

    /// The vote RPC to `from` failed outright
    pub fn handle_vote_failure(&mut self, election_term: u64, from: NodeId) -> ElectionOutcome {
        if !self.election_live(election_term) {
            return ElectionOutcome::Stale;
        }
        let outcome = match self.votes.as_mut() {
            Some(tally) => tally.record_unreachable(from),
            None => return ElectionOutcome::Stale,
        };
        self.conclude(outcome)
    }

    /// Re-evaluate the tally without a new reply (single-node clusters win here)
    pub fn settle_election(&mut self, election_term: u64) -> ElectionOutcome {
        if !self.election_live(election_term) {
            return ElectionOutcome::Stale;
        }
        let outcome = match self.votes.as_ref() {
            Some(tally) => tally.outcome(),
            None => return ElectionOutcome::Stale,
        };
        self.conclude(outcome)
    }

    /// Every reply is in and nothing was decided: fall back to follower and
    /// let the election timer try again.
    pub fn abandon_election(&mut self, election_term: u64) {
        if self.election_live(election_term) {
            self.become_follower();
        }
    }

    fn election_live(&self, term: u64) -> bool {
        self.state == NodeState::Candidate && self.current_term == term
    }

    fn conclude(&mut self, outcome: ElectionOutcome) -> ElectionOutcome {
        match outcome {
            ElectionOutcome::Won => self.become_leader(),
            ElectionOutcome::Lost => self.become_follower(),
            ElectionOutcome::Pending | ElectionOutcome::Stale => {}
        }
        outcome
    }

    /// RequestVote receiver: at most one vote per term, only for a log at
    /// least as up-to-date as ours.
    pub fn handle_vote_request(&mut self, request: &VoteRequest) -> VoteResponse {
        self.observe_term(request.term);

        let vote_free = self.voted_for.map_or(true, |v| v == request.candidate_id);
        let granted = request.term == self.current_term
            && vote_free
            && self.log.is_up_to_date(request.last_log_index, request.last_log_term);

        if granted {
            if self.voted_for != Some(request.candidate_id) {
                self.voted_for = Some(request.candidate_id);
                self.dirty = true;
            }
            self.last_heartbeat = Instant::now();
        }

        VoteResponse {
            term: self.current_term,
            vote_granted: granted,
        }
    }

    // -- client commands --

    /// Append a command to the leader's log; does not wait for replication
    pub fn start(&mut self, command: Vec<u8>) -> Result<Proposal, RaftError> {
        if !self.is_leader() {
            return Err(RaftError::NotLeader {
                term: self.current_term,
            });
        }
        let index = self.log.append(LogEntry::new(self.current_term, command));
        self.dirty = true;
        Ok(Proposal {
            index,
            term: self.current_term,
        })
    }

    // -- replication, leader side --

    /// AppendEntries for `peer` starting at its nextIndex. With
    /// `with_entries == false` this is a heartbeat carrying only the
    /// consistency check and commit index.
    pub fn append_entries_for(&self, peer: NodeId, with_entries: bool) -> Option<AppendEntriesRequest> {
        if !self.is_leader() {
            return None;
        }
        let leader = self.leader.as_ref()?;
        let next = (*leader.next_index.get(peer)?).min(self.log.next_index());
        let prev_log_index = next.checked_sub(1);

        Some(AppendEntriesRequest {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term: self.log.term_at(prev_log_index).unwrap_or(0),
            entries: if with_entries {
                self.log.entries_from(next)
            } else {
                Vec::new()
            },
            leader_commit: self.commit_index,
        })
    }

    /// Requests for every peer whose nextIndex is within our log
    pub fn replication_requests(&self) -> Vec<(NodeId, AppendEntriesRequest)> {
        let Some(leader) = self.leader.as_ref().filter(|_| self.is_leader()) else {
            return Vec::new();
        };
        let end = self.log.next_index();
        self.peers()
            .filter(|p| leader.next_index[*p] < end)
            .filter_map(|p| self.append_entries_for(p, true).map(|req| (p, req)))
            .collect()
    }

    /// Empty AppendEntries for every peer; refreshes our own heartbeat stamp
    pub fn heartbeat_requests(&mut self) -> Vec<(NodeId, AppendEntriesRequest)> {
        if !self.is_leader() {
            return Vec::new();
        }
        self.last_heartbeat = Instant::now();
        self.peers()
            .filter_map(|p| self.append_entries_for(p, false).map(|req| (p, req)))
            .collect()
    }

    /// Fold a follower's AppendEntries reply back into leader progress.
    /// Returns true when the commit index advanced.
    pub fn handle_append_entries_response(
        &mut self,
        peer: NodeId,
        sent: AppendProgress,
        response: &AppendEntriesResponse,
    ) -> bool {
        if self.observe_term(response.term) {
            return false;
        }
        if !self.is_leader() || self.current_term != sent.term || peer == self.id {
            return false;
        }
        let Some(leader) = self.leader.as_mut() else {
            return false;
        };
        if peer >= leader.next_index.len() {
            return false;
        }

        if response.success {
            if sent.last_index > leader.match_index[peer] {
                leader.match_index[peer] = sent.last_index;
            }
            let next = sent.last_index.map_or(0, |i| i + 1);
            if next > leader.next_index[peer] {
                leader.next_index[peer] = next;
            }
            return self.advance_commit();
        }

        // log mismatch: step back one entry, or straight past a short follower log
        let probed = sent.sent_next_index();
        if probed > 0 && leader.next_index[peer] == probed {
            let past_follower = response.last_log_index.map_or(0, |i| i + 1);
            leader.next_index[peer] = (probed - 1).min(past_follower);
        }
        false
    }

    /// Move commitIndex to the highest index stored on a majority, but only
    /// when that entry belongs to the current term.
    pub fn advance_commit(&mut self) -> bool {
        if !self.is_leader() {
            return false;
        }
        let Some(leader) = self.leader.as_ref() else {
            return false;
        };

        let mut matched: Vec<Option<u64>> = (0..self.cluster_size)
            .map(|p| {
                if p == self.id {
                    self.log.last_index()
                } else {
                    leader.match_index[p]
                }
            })
            .collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));

        let candidate = matched[self.quorum_size() - 1];
        let Some(index) = candidate else {
            return false;
        };
        if candidate <= self.commit_index {
            return false;
        }
        if self.log.get(index).map(|e| e.term) != Some(self.current_term) {
            return false;
        }
        self.commit_index = candidate;
        true
    }

    // -- replication, follower side --

    /// AppendEntries receiver
    pub fn handle_append_entries(&mut self, request: AppendEntriesRequest) -> AppendEntriesResponse {
        if request.term < self.current_term {
            return self.append_reply(false);
        }
        self.observe_term(request.term);
        if self.state != NodeState::Follower {
            self.become_follower();
        }
        self.last_heartbeat = Instant::now();

        if !self.log.matches(request.prev_log_index, request.prev_log_term) {
            return self.append_reply(false);
        }

        let (changed, covered) = self.log.splice(request.prev_log_index, request.entries);
        if changed {
            self.dirty = true;
        }

        let commit = request.leader_commit.min(covered);
        if commit > self.commit_index {
            self.commit_index = commit;
        }
        self.append_reply(true)
    }

    fn append_reply(&self, success: bool) -> AppendEntriesResponse {
        AppendEntriesResponse {
            term: self.current_term,
            success,
            last_log_index: self.last_log_index(),
        }
    }

    // -- apply --

    /// Committed entries not yet handed to the state machine, oldest first.
    /// Advances lastApplied past everything returned.
    pub fn entries_to_apply(&mut self) -> Vec<ApplyMsg> {
        let mut ready = Vec::new();
        while self.last_applied < self.commit_index {
            let index = self.last_applied.map_or(0, |i| i + 1);
            let Some(entry) = self.log.get(index) else {
                break;
            };
            ready.push(ApplyMsg::Command {
                command: entry.command.clone(),
                index,
            });
            self.last_applied = Some(index);
        }
        ready
    }
}
