//! Due-time index: a min-heap of pending occurrences and retry attempts.
//!
//! Entries are not removed when superseded. Each carries the generation of
//! the task field it was derived from; a mismatch at pop time marks it stale.
//! Stale entries that pile up ahead of their due time are pruned in bulk.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// The task's `next_run_at`, checked against `schedule_gen`.
    Occurrence,
    /// A pending attempt of an active run, checked against `attempt_gen`.
    Attempt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DueEntry {
    pub at: DateTime<Utc>,
    /// Registration order of the task; breaks ties between equal due times.
    pub seq: u64,
    pub kind: EntryKind,
    pub generation: u64,
    pub id: String,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.seq.cmp(&other.seq))
            .then(self.generation.cmp(&other.generation))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| (self.kind as u8).cmp(&(other.kind as u8)))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct DueQueue {
    heap: BinaryHeap<Reverse<DueEntry>>,
}

impl DueQueue {
    pub fn push(&mut self, entry: DueEntry) {
        self.heap.push(Reverse(entry));
    }

    /// Earliest due time, stale entries included.
    pub fn peek_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    /// Remove and return every entry due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<DueEntry> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(e)| e.at <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&DueEntry) -> bool) {
        self.heap.retain(|Reverse(entry)| keep(entry));
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn entry(secs: u32, seq: u64, id: &str) -> DueEntry {
        DueEntry {
            at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, secs).unwrap(),
            seq,
            kind: EntryKind::Occurrence,
            generation: 1,
            id: id.to_string(),
        }
    }

    #[test]
    fn pops_only_due_entries_in_order() {
        let mut q = DueQueue::default();
        q.push(entry(30, 1, "c"));
        q.push(entry(10, 2, "b"));
        q.push(entry(10, 0, "a"));
        q.push(entry(50, 3, "d"));

        let due = q.pop_due(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap());
        let ids: Vec<_> = due.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(q.len(), 1);
        assert_eq!(
            q.peek_at(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 50).unwrap())
        );
    }

    #[test]
    fn empty_queue_has_no_due_time() {
        let mut q = DueQueue::default();
        assert_eq!(q.peek_at(), None);
        assert!(q.pop_due(Utc::now()).is_empty());
    }
}
