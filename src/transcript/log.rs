//! Bounded, time-ordered transcript log.
//!
//! An indexed arena: entries are keyed by a monotonically increasing
//! sequence number, with a FIFO order queue for eviction and an id map
//! for O(1) removal by transcript id (the dedup override path).
//! Sequence numbers are never reused, so a removed entry leaves a stale
//! number in the order queue that iteration and eviction simply skip.

use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::types::Transcript;

pub struct TranscriptLog {
    entries: HashMap<u64, Transcript>,
    order: VecDeque<u64>,
    index: HashMap<Uuid, u64>,
    next_seq: u64,
    max_size: usize,
}

impl TranscriptLog {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            index: HashMap::new(),
            next_seq: 0,
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a transcript. Returns the entry evicted to stay within
    /// the size bound, if any.
    pub fn push(&mut self, transcript: Transcript) -> Option<Transcript> {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert(transcript.id, seq);
        self.entries.insert(seq, transcript);
        self.order.push_back(seq);

        if self.entries.len() > self.max_size {
            self.evict_oldest()
        } else {
            None
        }
    }

    /// Remove a stored transcript by id in O(1).
    pub fn remove(&mut self, id: Uuid) -> Option<Transcript> {
        let seq = self.index.remove(&id)?;
        let removed = self.entries.remove(&seq);
        // Tidy the front eagerly so stale numbers do not pile up there
        while matches!(self.order.front(), Some(front) if !self.entries.contains_key(front)) {
            self.order.pop_front();
        }
        removed
    }

    fn evict_oldest(&mut self) -> Option<Transcript> {
        while let Some(seq) = self.order.pop_front() {
            if let Some(evicted) = self.entries.remove(&seq) {
                self.index.remove(&evicted.id);
                return Some(evicted);
            }
            // stale number from an earlier removal; keep popping
        }
        None
    }

    /// Entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Transcript> {
        self.order.iter().filter_map(|seq| self.entries.get(seq))
    }

    /// Entries newest-first.
    pub fn iter_rev(&self) -> impl Iterator<Item = &Transcript> {
        self.order
            .iter()
            .rev()
            .filter_map(|seq| self.entries.get(seq))
    }

    pub fn to_vec(&self) -> Vec<Transcript> {
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StreamSource;
    use crate::transcript::types::TranscriptKind;

    fn transcript(text: &str, timestamp_ms: u64) -> Transcript {
        Transcript {
            id: Uuid::new_v4(),
            session_id: "s".to_string(),
            source: StreamSource::Microphone,
            speaker: "You".to_string(),
            text: text.to_string(),
            confidence: 1.0,
            timestamp_ms,
            kind: TranscriptKind::Final,
        }
    }

    #[test]
    fn eviction_is_fifo_and_size_is_bounded() {
        let mut log = TranscriptLog::new(3);
        for i in 0..5 {
            let evicted = log.push(transcript(&format!("t{}", i), i));
            if i < 3 {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.unwrap().text, format!("t{}", i - 3));
            }
            assert!(log.len() <= 3);
        }
        let texts: Vec<_> = log.iter().map(|t| t.text.clone()).collect();
        assert_eq!(texts, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn remove_by_id_preserves_order_of_the_rest() {
        let mut log = TranscriptLog::new(10);
        let a = transcript("a", 0);
        let b = transcript("b", 1);
        let c = transcript("c", 2);
        let b_id = b.id;
        log.push(a);
        log.push(b);
        log.push(c);

        let removed = log.remove(b_id).unwrap();
        assert_eq!(removed.text, "b");
        assert_eq!(log.len(), 2);
        let texts: Vec<_> = log.iter().map(|t| t.text.clone()).collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert!(log.remove(b_id).is_none());
    }

    #[test]
    fn eviction_skips_stale_sequence_numbers() {
        let mut log = TranscriptLog::new(2);
        let a = transcript("a", 0);
        let a_id = a.id;
        log.push(a);
        log.push(transcript("b", 1));
        log.remove(a_id);
        log.push(transcript("c", 2));
        log.push(transcript("d", 3));
        let texts: Vec<_> = log.iter().map(|t| t.text.clone()).collect();
        assert_eq!(texts, vec!["c", "d"]);
    }

    #[test]
    fn newest_first_iteration() {
        let mut log = TranscriptLog::new(10);
        log.push(transcript("a", 0));
        log.push(transcript("b", 1));
        let texts: Vec<_> = log.iter_rev().map(|t| t.text.clone()).collect();
        assert_eq!(texts, vec!["b", "a"]);
    }
}
