//! MVCC allocator: the monotonic `tx_id` counter and the snapshot
//! watermark. Resolution (commit or abort) can complete out of order across
//! concurrent transactions, so the watermark only advances past a
//! contiguous run of already-resolved ids — a read using
//! `current_snapshot()` must never see a still-open transaction's tx_id as
//! "resolved".

use crate::types::TxId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct MvccAllocator {
    next_tx_id: AtomicU64,
    /// Highest tx_id such that every tx_id in `1..=floor` has a known fate
    /// (committed or aborted).
    floor: AtomicU64,
    /// Resolved tx_ids ahead of `floor` waiting for the gap to close.
    pending: Mutex<BTreeSet<TxId>>,
}

impl MvccAllocator {
    pub fn new() -> Self {
        Self {
            next_tx_id: AtomicU64::new(1),
            floor: AtomicU64::new(0),
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Allocates the next `tx_id`. Ids start at 1 and are never reused.
    pub fn next_tx_id(&self) -> TxId {
        self.next_tx_id.fetch_add(1, Ordering::SeqCst)
    }

    /// The largest fully-resolved tx_id currently observable.
    pub fn current_snapshot(&self) -> TxId {
        self.floor.load(Ordering::SeqCst)
    }

    /// Marks `tx_id` resolved (committed or aborted) and advances the
    /// watermark past any contiguous run of resolved ids.
    pub fn resolve(&self, tx_id: TxId) {
        let mut pending = self.pending.lock();
        pending.insert(tx_id);
        let mut floor = self.floor.load(Ordering::SeqCst);
        while pending.remove(&(floor + 1)) {
            floor += 1;
        }
        self.floor.store(floor, Ordering::SeqCst);
    }

    /// Used only by recovery to seed state from what was observed on disk:
    /// `next` becomes the next id to allocate, `floor` the resolved watermark.
    pub fn seed(&self, next: TxId, floor: TxId) {
        self.next_tx_id.store(next, Ordering::SeqCst);
        self.floor.store(floor, Ordering::SeqCst);
        self.pending.lock().clear();
    }
}

impl Default for MvccAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_allocation() {
        let a = MvccAllocator::new();
        let t1 = a.next_tx_id();
        let t2 = a.next_tx_id();
        assert!(t1 < t2);
    }

    #[test]
    fn watermark_advances_in_order() {
        let a = MvccAllocator::new();
        let t1 = a.next_tx_id();
        let t2 = a.next_tx_id();
        let t3 = a.next_tx_id();
        assert_eq!(a.current_snapshot(), 0);
        a.resolve(t1);
        assert_eq!(a.current_snapshot(), t1);
        a.resolve(t3);
        // t2 still unresolved: watermark cannot skip over it.
        assert_eq!(a.current_snapshot(), t1);
        a.resolve(t2);
        assert_eq!(a.current_snapshot(), t3);
    }
}
