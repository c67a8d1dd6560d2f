//! Recovery: because every durable effect is reached only through a WAL
//! `Commit` marker (or, cross-partition, a coordinator `Commit` decision),
//! "undo" reduces to "never apply" — there is no physical undo to perform,
//! since nothing aborted or in-doubt-and-unresolved was ever applied in the
//! first place.
//!
//! Each partition carries a `floor`: the tx_id up to which its state is
//! already durably materialized, established by the most recent
//! `save_index_snapshot` call. Replay skips every transaction at or below
//! the floor instead of re-appending its payloads to the data file, which
//! is always opened in append-only mode and so would otherwise grow
//! without bound across repeated restarts.

use crate::partition::Partition;
use crate::storage::WalRecord;
use crate::txn::coordinator_log::{CoordinatorLog, Decision};
use crate::types::{DocumentVersion, OpType, TxId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct RecoveryReport {
    pub partitions_recovered: usize,
    pub committed_tx_count: usize,
    pub aborted_tx_count: usize,
    pub in_doubt_resolved_count: usize,
    pub already_materialized_count: usize,
    pub next_tx_id: TxId,
}

/// Replays one partition's WAL, applying every transaction resolved as
/// committed, above `floor`, in ascending tx_id order. Returns the highest
/// tx_id observed on this partition plus per-resolution counts.
fn recover_partition(
    partition: &Partition,
    floor: TxId,
    coordinator_decisions: &HashMap<TxId, Decision>,
) -> crate::error::Result<(TxId, usize, usize, usize, usize)> {
    let records = partition.wal.recover()?;

    let mut by_tx: HashMap<TxId, Vec<WalRecord>> = HashMap::new();
    let mut locally_committed: HashSet<TxId> = HashSet::new();
    let mut locally_aborted: HashSet<TxId> = HashSet::new();

    for rec in records {
        match rec.op_type {
            OpType::Commit => {
                locally_committed.insert(rec.tx_id);
            }
            OpType::Abort => {
                locally_aborted.insert(rec.tx_id);
            }
            _ => {
                by_tx.entry(rec.tx_id).or_default().push(rec);
            }
        }
    }

    let mut highest_tx_id: TxId = 0;
    let mut committed_count = 0usize;
    let mut aborted_count = 0usize;
    let mut in_doubt_resolved = 0usize;
    let mut already_materialized = 0usize;

    let mut tx_ids: Vec<TxId> = by_tx.keys().copied().collect();
    tx_ids.sort_unstable();

    for tx_id in tx_ids {
        highest_tx_id = highest_tx_id.max(tx_id);
        if tx_id <= floor {
            already_materialized += 1;
            continue;
        }
        let is_committed = if locally_committed.contains(&tx_id) {
            true
        } else if locally_aborted.contains(&tx_id) {
            false
        } else {
            // In-doubt: consult the coordinator log.
            in_doubt_resolved += 1;
            matches!(coordinator_decisions.get(&tx_id), Some(Decision::Commit))
        };

        if !is_committed {
            aborted_count += 1;
            continue;
        }
        committed_count += 1;

        let ops = &by_tx[&tx_id];
        for op in ops {
            match op.op_type {
                OpType::Create | OpType::Update | OpType::Patch => {
                    let offset = partition.data_file.append(&op.payload)?;
                    let version = DocumentVersion::new(op.doc_id, tx_id, offset, op.payload.len() as u32);
                    partition.index.set(&op.collection, version);
                }
                OpType::Delete => {
                    if let Some(mut existing) = partition.index.get_raw(&op.collection, op.doc_id) {
                        existing.deleted_tx_id = Some(tx_id);
                        partition.index.set(&op.collection, existing);
                    }
                }
                OpType::Commit | OpType::Abort => unreachable!("filtered above"),
            }
        }
    }

    for locally_committed_tx in locally_committed.iter() {
        highest_tx_id = highest_tx_id.max(*locally_committed_tx);
    }
    for locally_aborted_tx in locally_aborted.iter() {
        highest_tx_id = highest_tx_id.max(*locally_aborted_tx);
    }

    Ok((highest_tx_id, committed_count, aborted_count, in_doubt_resolved, already_materialized))
}

/// Open-time recovery for a logical DB: replay the coordinator log, then
/// every partition's WAL above its floor, resolving in-doubt transactions
/// via the coordinator decisions and applying resolved commits. `floors`
/// must be the same length as `partitions`, each entry coming from that
/// partition's most recently saved index snapshot (0 if none exists).
pub fn recover(
    coordinator: &CoordinatorLog,
    partitions: &[Arc<Partition>],
    floors: &[TxId],
) -> crate::error::Result<RecoveryReport> {
    let decisions = coordinator.recover()?;

    let mut report = RecoveryReport {
        partitions_recovered: partitions.len(),
        ..Default::default()
    };
    let mut highest_tx_id: TxId = 0;

    for (partition, &floor) in partitions.iter().zip(floors) {
        let (part_max, committed, aborted, in_doubt, materialized) =
            recover_partition(partition, floor, &decisions)?;
        highest_tx_id = highest_tx_id.max(part_max);
        report.committed_tx_count += committed;
        report.aborted_tx_count += aborted;
        report.in_doubt_resolved_count += in_doubt;
        report.already_materialized_count += materialized;
    }

    for tx_id in decisions.keys() {
        highest_tx_id = highest_tx_id.max(*tx_id);
    }

    report.next_tx_id = highest_tx_id + 1;
    if report.in_doubt_resolved_count > 0 {
        eprintln!(
            "[partitiondb] recovery: resolved {} in-doubt transaction(s) via the coordinator log",
            report.in_doubt_resolved_count
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityLevel, EngineConfig};
    use crate::storage::WalRecord;
    use tempfile::tempdir;

    fn rec(tx: u64, doc: u64, op: OpType, payload: &[u8]) -> WalRecord {
        WalRecord {
            lsn: 0,
            tx_id: tx,
            db_id: 1,
            collection: "_default".into(),
            op_type: op,
            doc_id: doc,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn crash_before_commit_is_not_visible() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let partition = Arc::new(Partition::open(0, dir.path(), dir.path(), "t", &cfg).unwrap());
        let mut batch = vec![rec(1, 42, OpType::Create, b"{\"x\":1}")];
        partition.wal.append_batch(&mut batch, DurabilityLevel::Sync).unwrap();

        let coordinator = CoordinatorLog::open(dir.path().join("coordinator.log")).unwrap();
        let report = recover(&coordinator, std::slice::from_ref(&partition), &[0]).unwrap();
        assert_eq!(report.committed_tx_count, 0);
        assert!(partition.index.get_raw("_default", 42).is_none());
        assert_eq!(report.next_tx_id, 2);
    }

    #[test]
    fn crash_after_commit_is_visible() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let partition = Arc::new(Partition::open(0, dir.path(), dir.path(), "t", &cfg).unwrap());
        let mut batch = vec![
            rec(1, 42, OpType::Create, b"{\"x\":1}"),
            rec(1, 42, OpType::Commit, b""),
        ];
        partition.wal.append_batch(&mut batch, DurabilityLevel::Sync).unwrap();

        let coordinator = CoordinatorLog::open(dir.path().join("coordinator.log")).unwrap();
        let report = recover(&coordinator, std::slice::from_ref(&partition), &[0]).unwrap();
        assert_eq!(report.committed_tx_count, 1);
        let v = partition.index.get_raw("_default", 42).unwrap();
        assert!(v.visible_at(1));
        let bytes = partition.data_file.read(v.data_offset, v.payload_len).unwrap();
        assert_eq!(bytes, b"{\"x\":1}");
    }

    #[test]
    fn in_doubt_resolved_via_coordinator_commit() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let partition = Arc::new(Partition::open(0, dir.path(), dir.path(), "t", &cfg).unwrap());
        // Phase-1-only WAL record, no local commit/abort marker.
        let mut batch = vec![rec(7, 1, OpType::Create, b"{\"a\":1}")];
        partition.wal.append_batch(&mut batch, DurabilityLevel::Sync).unwrap();

        let coordinator = CoordinatorLog::open(dir.path().join("coordinator.log")).unwrap();
        coordinator.append(7, Decision::Commit).unwrap();

        let report = recover(&coordinator, std::slice::from_ref(&partition), &[0]).unwrap();
        assert_eq!(report.in_doubt_resolved_count, 1);
        assert_eq!(report.committed_tx_count, 1);
        assert!(partition.index.get_raw("_default", 1).is_some());
    }

    #[test]
    fn floor_skips_already_materialized_transactions() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let partition = Arc::new(Partition::open(0, dir.path(), dir.path(), "t", &cfg).unwrap());
        let mut batch = vec![
            rec(1, 42, OpType::Create, b"{\"x\":1}"),
            rec(1, 42, OpType::Commit, b""),
        ];
        partition.wal.append_batch(&mut batch, DurabilityLevel::Sync).unwrap();
        let before = partition.data_file.size().unwrap();

        let coordinator = CoordinatorLog::open(dir.path().join("coordinator.log")).unwrap();
        let report = recover(&coordinator, std::slice::from_ref(&partition), &[1]).unwrap();
        assert_eq!(report.already_materialized_count, 1);
        assert_eq!(report.committed_tx_count, 0);
        // Nothing was re-appended to the data file below the floor.
        assert_eq!(partition.data_file.size().unwrap(), before);
    }
}
