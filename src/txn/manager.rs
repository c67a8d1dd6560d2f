//! Transaction manager: tracks open transactions, their buffered ops,
//! snapshot, and read set, keyed by tx_id in an arena with state modeled
//! as a proper sum type rather than a pile of booleans.

use crate::error::{EngineError, Result};
use crate::txn::mvcc::MvccAllocator;
use crate::types::{DocId, OpType, TxId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct PendingOp {
    pub collection: String,
    pub doc_id: DocId,
    pub op_type: OpType,
    /// For Create/Update: the literal new payload. For Patch: the patch
    /// document (a JSON array of operations) to apply at commit time.
    /// For Delete: empty.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub tx_id: TxId,
    pub snapshot_tx_id: TxId,
    pub state: TxState,
    pub ops: Vec<PendingOp>,
    pub read_set: HashSet<(String, DocId)>,
}

impl Transaction {
    /// Overlays this transaction's own buffered ops on top of a base read:
    /// a pending delete shadows the base value as not-found; a pending
    /// create/update/patch shadows it with the buffered payload.
    pub fn overlay(&self, collection: &str, doc_id: DocId) -> Option<OverlayResult> {
        self.ops
            .iter()
            .rev()
            .find(|op| op.collection == collection && op.doc_id == doc_id)
            .map(|op| match op.op_type {
                OpType::Delete => OverlayResult::Deleted,
                _ => OverlayResult::Payload(op.payload.clone()),
            })
    }
}

pub enum OverlayResult {
    Payload(Vec<u8>),
    Deleted,
}

pub struct TransactionManager {
    allocator: Arc<MvccAllocator>,
    active: DashMap<TxId, Transaction>,
}

impl TransactionManager {
    pub fn new(allocator: Arc<MvccAllocator>) -> Self {
        Self {
            allocator,
            active: DashMap::new(),
        }
    }

    pub fn begin(&self) -> TxId {
        let tx_id = self.allocator.next_tx_id();
        let snapshot_tx_id = self.allocator.current_snapshot();
        self.active.insert(
            tx_id,
            Transaction {
                tx_id,
                snapshot_tx_id,
                state: TxState::Open,
                ops: Vec::new(),
                read_set: HashSet::new(),
            },
        );
        tx_id
    }

    pub fn add_op(&self, tx_id: TxId, op: PendingOp) -> Result<()> {
        let mut tx = self
            .active
            .get_mut(&tx_id)
            .ok_or(EngineError::TxNotFound(tx_id))?;
        if tx.state != TxState::Open {
            return Err(EngineError::TxAlreadyClosed(tx_id));
        }
        tx.ops.push(op);
        Ok(())
    }

    pub fn record_read(&self, tx_id: TxId, collection: &str, doc_id: DocId) -> Result<()> {
        let mut tx = self
            .active
            .get_mut(&tx_id)
            .ok_or(EngineError::TxNotFound(tx_id))?;
        if tx.state != TxState::Open {
            return Err(EngineError::TxAlreadyClosed(tx_id));
        }
        tx.read_set.insert((collection.to_string(), doc_id));
        Ok(())
    }

    /// Snapshots the transaction's current buffered state without removing it.
    pub fn snapshot_of(&self, tx_id: TxId) -> Result<Transaction> {
        self.active
            .get(&tx_id)
            .map(|t| t.clone())
            .ok_or(EngineError::TxNotFound(tx_id))
    }

    /// Removes and returns the transaction, verifying it was Open. Used by
    /// commit/rollback, which own the subsequent state transition.
    pub fn take_open(&self, tx_id: TxId) -> Result<Transaction> {
        let (_, tx) = self
            .active
            .remove(&tx_id)
            .ok_or(EngineError::TxNotFound(tx_id))?;
        if tx.state != TxState::Open {
            return Err(EngineError::TxAlreadyClosed(tx_id));
        }
        Ok(tx)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_allocates_and_snapshots() {
        let alloc = Arc::new(MvccAllocator::new());
        let mgr = TransactionManager::new(alloc.clone());
        let tx1 = mgr.begin();
        alloc.resolve(tx1);
        let tx2 = mgr.begin();
        let tx2_snap = mgr.snapshot_of(tx2).unwrap();
        assert_eq!(tx2_snap.snapshot_tx_id, tx1);
        assert!(tx2 > tx1);
    }

    #[test]
    fn closed_tx_rejects_ops() {
        let alloc = Arc::new(MvccAllocator::new());
        let mgr = TransactionManager::new(alloc);
        let tx = mgr.begin();
        mgr.take_open(tx).unwrap();
        let err = mgr.add_op(
            tx,
            PendingOp {
                collection: "_default".into(),
                doc_id: 1,
                op_type: OpType::Create,
                payload: vec![],
            },
        );
        assert!(matches!(err, Err(EngineError::TxNotFound(_))));
    }

    #[test]
    fn overlay_prefers_latest_buffered_op() {
        let tx = Transaction {
            tx_id: 1,
            snapshot_tx_id: 0,
            state: TxState::Open,
            ops: vec![
                PendingOp {
                    collection: "_default".into(),
                    doc_id: 1,
                    op_type: OpType::Create,
                    payload: b"a".to_vec(),
                },
                PendingOp {
                    collection: "_default".into(),
                    doc_id: 1,
                    op_type: OpType::Update,
                    payload: b"b".to_vec(),
                },
            ],
            read_set: HashSet::new(),
        };
        match tx.overlay("_default", 1) {
            Some(OverlayResult::Payload(p)) => assert_eq!(p, b"b"),
            _ => panic!("expected payload overlay"),
        }
    }
}
