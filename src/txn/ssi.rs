//! SSI-lite conflict detection: a bounded ring of recent commits, consulted
//! under the logical-DB commit-serialization mutex to approximate
//! serializability without the cost of tracking every transaction's full
//! read/write history indefinitely.

use crate::types::{DocId, TxId};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

pub type Key = (String, DocId);

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub tx_id: TxId,
    pub read_set: HashSet<Key>,
    pub write_set: HashSet<Key>,
}

/// Bounded, ascending-tx_id ring of recent commits.
pub struct CommitHistory {
    capacity: usize,
    records: Mutex<VecDeque<CommitRecord>>,
}

impl CommitHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, record: CommitRecord) {
        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Every commit record with `tx_id > snapshot`, found via a lower-bound
    /// binary search over the ascending-tx_id ring (O(log n + k) in the
    /// ring's size and the number of matching records).
    pub fn records_after(&self, snapshot: TxId) -> Vec<CommitRecord> {
        let mut records = self.records.lock();
        let slice = records.make_contiguous();
        let idx = slice.partition_point(|r| r.tx_id <= snapshot);
        slice[idx..].to_vec()
    }

    /// True if the bounded window still covers `snapshot` (i.e. no commit
    /// that could conflict with a tx at this snapshot has been evicted).
    pub fn window_covers(&self, snapshot: TxId) -> bool {
        let records = self.records.lock();
        match records.front() {
            Some(oldest) => snapshot + 1 >= oldest.tx_id,
            None => true,
        }
    }
}

/// Checks `tx_read_set`/`tx_write_set` (the committing transaction's sets)
/// against every commit that became visible after `snapshot_tx_id`. Returns
/// `true` if a conflict is found: a concurrent commit's write_set
/// intersects this tx's read_set, or this tx's write_set intersects that
/// commit's read_set.
pub fn has_conflict(
    history: &CommitHistory,
    snapshot_tx_id: TxId,
    tx_read_set: &HashSet<Key>,
    tx_write_set: &HashSet<Key>,
) -> bool {
    if !history.window_covers(snapshot_tx_id) {
        // Window exceeded: silently degrade to snapshot isolation.
        return false;
    }
    for record in history.records_after(snapshot_tx_id) {
        if record.write_set.iter().any(|k| tx_read_set.contains(k)) {
            return true;
        }
        if tx_write_set.iter().any(|k| record.read_set.contains(k)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(doc: u64) -> Key {
        ("_default".to_string(), doc)
    }

    #[test]
    fn detects_write_skew_conflict() {
        let history = CommitHistory::new(16);
        // Tx1 committed at tx_id=2, wrote doc 1, after snapshot 1.
        history.push(CommitRecord {
            tx_id: 2,
            read_set: [key(1)].into_iter().collect(),
            write_set: [key(1)].into_iter().collect(),
        });

        let tx2_read: HashSet<Key> = [key(1)].into_iter().collect();
        let tx2_write: HashSet<Key> = [key(2)].into_iter().collect();
        assert!(has_conflict(&history, 1, &tx2_read, &tx2_write));
    }

    #[test]
    fn no_conflict_when_sets_disjoint() {
        let history = CommitHistory::new(16);
        history.push(CommitRecord {
            tx_id: 2,
            read_set: [key(5)].into_iter().collect(),
            write_set: [key(5)].into_iter().collect(),
        });
        let tx_read: HashSet<Key> = [key(1)].into_iter().collect();
        let tx_write: HashSet<Key> = [key(2)].into_iter().collect();
        assert!(!has_conflict(&history, 1, &tx_read, &tx_write));
    }

    #[test]
    fn window_exceeded_degrades_silently() {
        let history = CommitHistory::new(1);
        history.push(CommitRecord {
            tx_id: 10,
            read_set: HashSet::new(),
            write_set: [key(1)].into_iter().collect(),
        });
        history.push(CommitRecord {
            tx_id: 20,
            read_set: HashSet::new(),
            write_set: [key(1)].into_iter().collect(),
        });
        // tx_id=10's record was evicted; a tx with snapshot below it cannot
        // be fully checked, so no conflict is reported.
        let tx_read: HashSet<Key> = [key(1)].into_iter().collect();
        assert!(!history.window_covers(1));
        assert!(!has_conflict(&history, 1, &tx_read, &HashSet::new()));
    }

    #[test]
    fn records_after_is_ascending_and_bounded() {
        let history = CommitHistory::new(16);
        for id in 1..=5u64 {
            history.push(CommitRecord {
                tx_id: id,
                read_set: HashSet::new(),
                write_set: HashSet::new(),
            });
        }
        let after = history.records_after(3);
        let ids: Vec<u64> = after.iter().map(|r| r.tx_id).collect();
        assert_eq!(ids, vec![4, 5]);
    }
}
