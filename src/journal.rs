//! Append-only, per-topic ordered log (§4.7, §3.3).
//!
//! Sequences are allocated from a single atomic counter shared across
//! topics — a deliberate design choice (global ordering, not per-topic)
//! that keeps the in-memory implementation trivial while still preserving
//! per-topic monotonicity. A production file-backed journal would more
//! naturally use a sequence counter per topic; that change is compatible
//! with every invariant stated here.

use crate::clock::{SequenceCounter, TscClock};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp: u64,
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

/// Where a [`Reader`] should start within a topic's entries.
#[derive(Debug, Clone, Copy)]
pub enum Position {
    Beginning,
    End,
    Sequence(u64),
    Time(u64),
}

pub struct TopicConfig {
    pub name: String,
}

pub struct Journal {
    topics: DashMap<String, RwLock<Vec<JournalEntry>>>,
    sequence: SequenceCounter,
    clock: TscClock,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Journal {
            topics: DashMap::new(),
            sequence: SequenceCounter::new(),
            clock: TscClock::new(),
        }
    }

    /// Idempotently ensures a topic exists.
    pub fn create_topic(&self, config: TopicConfig) {
        self.topics.entry(config.name).or_insert_with(|| RwLock::new(Vec::new()));
    }

    pub fn append(&self, topic: &str, key: Option<Vec<u8>>, payload: Vec<u8>) -> u64 {
        self.append_with_headers(topic, key, payload, HashMap::new())
    }

    pub fn append_with_headers(
        &self,
        topic: &str,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> u64 {
        let sequence = self.sequence.next();
        let entry = JournalEntry {
            sequence,
            timestamp: self.clock.now_tsc(),
            topic: topic.to_string(),
            key,
            payload,
            headers,
        };
        let topic_log = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| RwLock::new(Vec::new()));
        topic_log.write().unwrap().push(entry);
        sequence
    }

    /// Last entry's sequence for `topic`, or 0 if the topic is empty or
    /// absent.
    pub fn end_position(&self, topic: &str) -> u64 {
        self.topics
            .get(topic)
            .and_then(|log| log.read().unwrap().last().map(|e| e.sequence))
            .unwrap_or(0)
    }

    /// Snapshots the topic's current entries (empty if the topic is
    /// absent) and positions the reader per `position`. The reader does
    /// NOT see writes appended after this call.
    pub fn reader(&self, topic: &str, position: Position) -> Reader {
        let entries = self
            .topics
            .get(topic)
            .map(|log| log.read().unwrap().clone())
            .unwrap_or_default();
        let mut reader = Reader { entries, index: 0 };
        reader.seek(position);
        reader
    }
}

pub struct Reader {
    entries: Vec<JournalEntry>,
    index: usize,
}

impl Reader {
    /// Repositions within the same snapshot; does not refresh with newer
    /// writes made to the journal after the snapshot was taken.
    pub fn seek(&mut self, position: Position) {
        self.index = match position {
            Position::Beginning => 0,
            Position::End => self.entries.len(),
            Position::Sequence(s) => self
                .entries
                .iter()
                .position(|e| e.sequence >= s)
                .unwrap_or(self.entries.len()),
            Position::Time(t) => self
                .entries
                .iter()
                .position(|e| e.timestamp >= t)
                .unwrap_or(self.entries.len()),
        };
    }

    pub fn next(&mut self) -> Option<JournalEntry> {
        let entry = self.entries.get(self.index).cloned();
        if entry.is_some() {
            self.index += 1;
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_allocates_gap_free_increasing_sequences_per_topic() {
        let journal = Journal::new();
        let sequences: Vec<u64> = (0..5)
            .map(|i| journal.append("trades", None, vec![i]))
            .collect();
        for pair in sequences.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }

    #[test]
    fn seek_to_sequence_returns_entries_at_or_after_it() {
        let journal = Journal::new();
        let sequences: Vec<u64> = (0..5)
            .map(|i| journal.append("trades", None, vec![i]))
            .collect();
        let cutoff = sequences[2];

        let mut reader = journal.reader("trades", Position::Sequence(cutoff));
        let mut seen = Vec::new();
        while let Some(entry) = reader.next() {
            seen.push(entry.sequence);
        }
        assert_eq!(seen, sequences[2..]);
    }

    #[test]
    fn seek_past_end_positions_at_end() {
        let journal = Journal::new();
        journal.append("trades", None, vec![1]);
        let mut reader = journal.reader("trades", Position::Sequence(u64::MAX));
        assert!(reader.next().is_none());
    }

    #[test]
    fn reader_snapshot_does_not_see_later_writes() {
        let journal = Journal::new();
        journal.append("trades", None, vec![1]);
        let mut reader = journal.reader("trades", Position::Beginning);
        journal.append("trades", None, vec![2]);
        assert_eq!(reader.next().unwrap().payload, vec![1]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn end_position_is_zero_for_empty_topic() {
        let journal = Journal::new();
        assert_eq!(journal.end_position("nonexistent"), 0);
    }
}
