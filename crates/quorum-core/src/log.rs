//! # log
//!
//! why: manage the ordered log of commands that raft replicates
//! relations: owned by node.rs, persisted through quorum-storage's codec
//! what: LogEntry struct, 0-based index addressing, consistency checks, splicing

use serde::{Deserialize, Serialize};

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: u64,
    /// The command to be applied to the state machine
    pub command: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, command: Vec<u8>) -> Self {
        Self { term, command }
    }
}

/// The ordered sequence of entries held by one replica.
///
/// Entries are addressed from index 0. Anything that names "the last index"
/// or "the entry before" is an `Option<u64>`, where `None` sits before the
/// first entry and always carries term 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Index of the last entry, `None` for an empty log
    pub fn last_index(&self) -> Option<u64> {
        (self.entries.len() as u64).checked_sub(1)
    }

    /// Term of the last entry, 0 for an empty log
    pub fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.term)
    }

    /// Index the next appended entry will occupy
    pub fn next_index(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        self.entries.get(index as usize)
    }

    /// Term stored at `index`. `None` as the index is the position before
    /// the log and reports term 0; an index past the end reports `None`.
    pub fn term_at(&self, index: Option<u64>) -> Option<u64> {
        match index {
            None => Some(0),
            Some(i) => self.get(i).map(|e| e.term),
        }
    }

    /// Append one entry and return the index it landed at
    pub fn append(&mut self, entry: LogEntry) -> u64 {
        self.entries.push(entry);
        self.entries.len() as u64 - 1
    }

    /// Clone every entry from `start` to the end of the log
    pub fn entries_from(&self, start: u64) -> Vec<LogEntry> {
        self.entries
            .get(start as usize..)
            .map(<[LogEntry]>::to_vec)
            .unwrap_or_default()
    }

    /// Drop every entry at `index` and after
    pub fn truncate_from(&mut self, index: u64) {
        self.entries.truncate(index as usize);
    }

    /// Whether this log holds an entry at `prev_index` with `prev_term`.
    pub fn matches(&self, prev_index: Option<u64>, prev_term: u64) -> bool {
        self.term_at(prev_index) == Some(prev_term)
    }

    /// Election restriction: is a log ending at (`last_index`, `last_term`)
    /// at least as up-to-date as this one?
    pub fn is_up_to_date(&self, last_index: Option<u64>, last_term: u64) -> bool {
        let our_term = self.last_term();
        last_term > our_term || (last_term == our_term && last_index >= self.last_index())
    }

    /// Splice `entries` in right after `prev_index`.
    ///
    /// Entries already present with the same term are kept. The first entry
    /// whose term differs truncates the rest of the log before the new suffix
    /// goes in. Returns whether the log changed and the index of the last
    /// entry the splice covered.
    ///
    /// The caller must have checked `matches(prev_index, ..)` first.
    pub fn splice(&mut self, prev_index: Option<u64>, entries: Vec<LogEntry>) -> (bool, Option<u64>) {
        let start = prev_index.map_or(0, |p| p + 1);
        let covered = match entries.len() as u64 {
            0 => prev_index,
            n => Some(start + n - 1),
        };

        let mut changed = false;
        for (offset, entry) in entries.into_iter().enumerate() {
            let index = start + offset as u64;
            match self.get(index) {
                Some(existing) if existing.term == entry.term => continue,
                Some(_) => {
                    self.truncate_from(index);
                    self.entries.push(entry);
                }
                None => self.entries.push(entry),
            }
            changed = true;
        }
        (changed, covered)
    }
}
