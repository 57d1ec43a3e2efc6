//! # message
//!
//! why: define the raft rpc payloads exchanged between replicas and the
//! messages handed to the service above
//! relations: produced and consumed by node.rs, carried by quorum-node's transport
//! what: VoteRequest/VoteResponse, AppendEntriesRequest/AppendEntriesResponse, ApplyMsg

use serde::{Deserialize, Serialize};

use crate::{LogEntry, NodeId};

/// Request a vote during leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: Option<u64>,
    pub last_log_term: u64,
}

/// Response to a vote request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: Option<u64>,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: Option<u64>,
}

impl AppendEntriesRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry this request covers
    pub fn last_index(&self) -> Option<u64> {
        match self.entries.len() as u64 {
            0 => self.prev_log_index,
            n => Some(self.prev_log_index.map_or(0, |p| p + 1) + n - 1),
        }
    }

    /// What the leader keeps to fold the reply back in
    pub fn progress(&self) -> AppendProgress {
        AppendProgress {
            term: self.term,
            prev_log_index: self.prev_log_index,
            last_index: self.last_index(),
        }
    }
}

/// Response to AppendEntries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// responder's last log index, lets the leader skip past a short log
    pub last_log_index: Option<u64>,
}

/// The range an in-flight AppendEntries covered, captured when it was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendProgress {
    pub term: u64,
    pub prev_log_index: Option<u64>,
    pub last_index: Option<u64>,
}

impl AppendProgress {
    /// The nextIndex value that produced this request
    pub fn sent_next_index(&self) -> u64 {
        self.prev_log_index.map_or(0, |p| p + 1)
    }
}

/// Delivered to the service for every committed entry, in index order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMsg {
    /// A newly committed command
    Command { command: Vec<u8>, index: u64 },
    /// Reserved for snapshot installation; never produced yet
    Snapshot { data: Vec<u8>, term: u64, index: u64 },
}

impl ApplyMsg {
    /// Whether this message carries a command (the `valid` flag of the delivery contract)
    pub fn is_command(&self) -> bool {
        matches!(self, ApplyMsg::Command { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prev: Option<u64>, n: usize) -> AppendEntriesRequest {
        AppendEntriesRequest {
            term: 1,
            leader_id: 0,
            prev_log_index: prev,
            prev_log_term: 0,
            entries: vec![LogEntry::new(1, vec![]); n],
            leader_commit: None,
        }
    }

    #[test]
    fn heartbeat_covers_up_to_prev() {
        let hb = request(Some(4), 0);
        assert!(hb.is_heartbeat());
        assert_eq!(hb.last_index(), Some(4));
        assert_eq!(request(None, 0).last_index(), None);
    }

    #[test]
    fn last_index_counts_entries_after_prev() {
        assert_eq!(request(None, 3).last_index(), Some(2));
        assert_eq!(request(Some(1), 2).last_index(), Some(3));
        assert_eq!(request(Some(1), 2).progress().sent_next_index(), 2);
    }
}
