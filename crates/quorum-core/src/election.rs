//! # election
//!
//! why: decide an election as soon as the outcome is certain
//! relations: owned by node.rs while a candidate, fed by quorum-node's vote fan-out
//! what: quorum arithmetic, VoteTally, ElectionOutcome

use std::collections::BTreeSet;

use crate::NodeId;

/// ⌊n/2⌋ + 1
pub fn quorum_size(cluster_size: usize) -> usize {
    cluster_size / 2 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// neither a majority nor its impossibility is known yet
    Pending,
    Won,
    Lost,
    /// the election's term or role has moved on; nothing to do
    Stale,
}

/// Votes collected by a candidate for a single term
#[derive(Debug, Clone)]
pub struct VoteTally {
    cluster_size: usize,
    granted: BTreeSet<NodeId>,
    denied: BTreeSet<NodeId>,
    unreachable: BTreeSet<NodeId>,
}

impl VoteTally {
    /// A fresh tally already holding the candidate's own vote
    pub fn new(cluster_size: usize, candidate: NodeId) -> Self {
        Self {
            cluster_size,
            granted: BTreeSet::from([candidate]),
            denied: BTreeSet::new(),
            unreachable: BTreeSet::new(),
        }
    }

    /// Record a reply. A peer is only counted once.
    pub fn record(&mut self, peer: NodeId, granted: bool) -> ElectionOutcome {
        if !self.has_answered(peer) {
            if granted {
                self.granted.insert(peer);
            } else {
                self.denied.insert(peer);
            }
        }
        self.outcome()
    }

    /// Record a peer whose RPC failed; it can no longer help this election
    pub fn record_unreachable(&mut self, peer: NodeId) -> ElectionOutcome {
        if !self.has_answered(peer) {
            self.unreachable.insert(peer);
        }
        self.outcome()
    }

    pub fn granted(&self) -> usize {
        self.granted.len()
    }

    pub fn denied(&self) -> usize {
        self.denied.len()
    }

    pub fn outcome(&self) -> ElectionOutcome {
        let quorum = quorum_size(self.cluster_size);
        let still_possible = self.cluster_size - self.denied.len() - self.unreachable.len();
        if self.granted.len() >= quorum {
            ElectionOutcome::Won
        } else if still_possible < quorum {
            ElectionOutcome::Lost
        } else {
            ElectionOutcome::Pending
        }
    }

    fn has_answered(&self, peer: NodeId) -> bool {
        self.granted.contains(&peer) || self.denied.contains(&peer) || self.unreachable.contains(&peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_sizes() {
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
    }

    #[test]
    fn single_node_wins_on_own_vote() {
        assert_eq!(VoteTally::new(1, 0).outcome(), ElectionOutcome::Won);
    }

    #[test]
    fn loses_once_majority_is_impossible() {
        let mut tally = VoteTally::new(5, 0);
        assert_eq!(tally.record(1, false), ElectionOutcome::Pending);
        assert_eq!(tally.record(2, false), ElectionOutcome::Pending);
        assert_eq!(tally.record(3, false), ElectionOutcome::Lost);
        assert_eq!(tally.denied(), 3);
        assert_eq!(tally.granted(), 1);
    }

    #[test]
    fn duplicate_replies_count_once() {
        let mut tally = VoteTally::new(5, 0);
        tally.record(1, true);
        tally.record(1, true);
        assert_eq!(tally.granted(), 2);
        assert_eq!(tally.outcome(), ElectionOutcome::Pending);
    }

    #[test]
    fn unreachable_peers_can_make_victory_impossible() {
        let mut tally = VoteTally::new(3, 0);
        assert_eq!(tally.record_unreachable(1), ElectionOutcome::Pending);
        assert_eq!(tally.record(2, false), ElectionOutcome::Lost);
        // an unreachable peer is neither a grant nor a denial
        assert_eq!(tally.denied(), 1);
    }
}
