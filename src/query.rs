//! Query / scan executor: a single snapshot captured once, fanned out
//! across partitions, merged, filtered, and limited.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::partition::Partition;
use crate::types::{DocId, TxId};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A query over one collection: an optional predicate over the raw payload
/// bytes, and a row-count limit (clamped to `max_query_limit`, never rejected).
pub struct Query {
    pub filter: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self {
            filter: None,
            limit: None,
        }
    }
}

/// Cooperative cancellation/timeout token shared across partition scanners,
/// bounding a query's wall-clock time without needing to interrupt a
/// thread mid-scan.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl CancelToken {
    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn tripped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }
}

pub struct QueryResult {
    pub rows: Vec<(DocId, Vec<u8>)>,
    pub bytes_scanned: u64,
}

/// Executes `query` over `collection` across every partition under a single
/// `snapshot`, merging results and applying the global limit. Never takes a
/// partition's write mutex — only shard RLocks via
/// `Partition::index::scan_visible` — so it cannot block writers beyond
/// that brief critical section, and writers cannot block it.
pub fn execute_query(
    partitions: &[Arc<Partition>],
    collection: &str,
    query: &Query,
    snapshot: TxId,
    config: &EngineConfig,
    cancel: &CancelToken,
) -> Result<QueryResult> {
    let bytes_scanned = AtomicU64::new(0);
    let effective_limit = query
        .limit
        .map(|l| l.min(config.max_query_limit))
        .unwrap_or(config.max_query_limit);

    let per_partition: Vec<Result<Vec<(DocId, Vec<u8>)>>> = partitions
        .par_iter()
        .map(|partition| -> Result<Vec<(DocId, Vec<u8>)>> {
            let mut out = Vec::new();
            for (doc_id, version) in partition.index.scan_visible(collection, snapshot) {
                if cancel.tripped() {
                    return Err(EngineError::QueryTimeout);
                }
                let payload = partition.data_file.read(version.data_offset, version.payload_len)?;
                let scanned = bytes_scanned.fetch_add(payload.len() as u64, Ordering::SeqCst) + payload.len() as u64;
                if scanned > config.max_query_memory_bytes {
                    return Err(EngineError::QueryMemoryLimit {
                        scanned,
                        cap: config.max_query_memory_bytes,
                    });
                }
                let matches = query.filter.as_ref().map(|f| f(&payload)).unwrap_or(true);
                if matches {
                    out.push((doc_id, payload));
                }
            }
            Ok(out)
        })
        .collect();

    let mut merged = Vec::new();
    for part in per_partition {
        merged.extend(part?);
    }
    merged.sort_by_key(|(doc_id, _)| *doc_id);
    merged.truncate(effective_limit);

    Ok(QueryResult {
        rows: merged,
        bytes_scanned: bytes_scanned.load(Ordering::SeqCst),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityLevel, EngineConfig};
    use crate::storage::WalRecord;
    use crate::types::{DocumentVersion, OpType};
    use tempfile::tempdir;

    fn make_partition(dir: &std::path::Path, id: usize, cfg: &EngineConfig) -> Arc<Partition> {
        Arc::new(Partition::open(id, dir, dir, "t", cfg).unwrap())
    }

    fn seed(partition: &Partition, collection: &str, doc_id: DocId, tx_id: TxId, payload: &[u8]) {
        let offset = partition.data_file.append(payload).unwrap();
        partition
            .index
            .set(collection, DocumentVersion::new(doc_id, tx_id, offset, payload.len() as u32));
        let mut batch = vec![WalRecord {
            lsn: 0,
            tx_id,
            db_id: 1,
            collection: collection.to_string(),
            op_type: OpType::Create,
            doc_id,
            payload: payload.to_vec(),
        }];
        partition.wal.append_batch(&mut batch, DurabilityLevel::Sync).unwrap();
    }

    #[test]
    fn scan_merges_across_partitions_under_one_snapshot() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let p0 = make_partition(dir.path(), 0, &cfg);
        let p1 = make_partition(dir.path(), 1, &cfg);
        seed(&p0, "_default", 1, 1, b"{\"a\":1}");
        seed(&p1, "_default", 2, 2, b"{\"b\":2}");

        let cancel = CancelToken::with_timeout(std::time::Duration::from_secs(5));
        let result = execute_query(&[p0, p1], "_default", &Query::all(), 2, &cfg, &cancel).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].0, 1);
        assert_eq!(result.rows[1].0, 2);
    }

    #[test]
    fn limit_is_clamped_not_rejected() {
        let dir = tempdir().unwrap();
        let mut cfg = EngineConfig::testing();
        cfg.max_query_limit = 1;
        let p0 = make_partition(dir.path(), 0, &cfg);
        seed(&p0, "_default", 1, 1, b"a");
        seed(&p0, "_default", 2, 1, b"b");

        let query = Query {
            filter: None,
            limit: Some(1000),
        };
        let cancel = CancelToken::with_timeout(std::time::Duration::from_secs(5));
        let result = execute_query(&[p0], "_default", &query, 1, &cfg, &cancel).unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn query_isolation_snapshot_excludes_later_writes() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::testing();
        let p0 = make_partition(dir.path(), 0, &cfg);
        seed(&p0, "_default", 1, 1, b"a");

        let cancel = CancelToken::with_timeout(std::time::Duration::from_secs(5));
        let snap_before = execute_query(&[p0], "_default", &Query::all(), 1, &cfg, &cancel).unwrap();
        assert_eq!(snap_before.rows.len(), 1);
    }
}
