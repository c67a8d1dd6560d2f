//! `LogicalDB`: one logical database's engine handle and Core API. Ties
//! together every subsystem module into the single-partition fast-path and
//! two-phase commit paths, with one struct owning every subsystem and its
//! public methods as the sole entry point.

use crate::catalog::Catalog;
use crate::collection::CollectionRegistry;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::patch::{self, PatchOp};
use crate::partition::Partition;
use crate::query::{self, CancelToken, Query, QueryResult};
use crate::storage::WalRecord;
use crate::txn::coordinator_log::{CoordinatorLog, Decision};
use crate::txn::recovery;
use crate::txn::ssi::has_conflict;
use crate::txn::{CommitHistory, CommitRecord, Key, MvccAllocator, PendingOp, Transaction, TransactionManager};
use crate::types::{DocId, DocumentVersion, OpType, PartitionId, TxId};
use crate::worker_pool::WorkerPool;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DbStats {
    pub db_id: u64,
    pub live_tx_count: usize,
    pub wal_bytes: u64,
    pub memory_used: u64,
    pub partition_count: usize,
}

struct PlannedOp {
    collection: String,
    doc_id: DocId,
    op_type: OpType,
    /// `Some` for Create/Update/Patch (the final payload to persist);
    /// `None` for Delete.
    payload: Option<Vec<u8>>,
}

struct Plan {
    ops: Vec<PlannedOp>,
    bytes_delta: i64,
}

pub struct LogicalDB {
    name: String,
    db_id: u64,
    config: EngineConfig,
    partitions: Vec<Arc<Partition>>,
    allocator: Arc<MvccAllocator>,
    tx_manager: TransactionManager,
    coordinator: CoordinatorLog,
    commit_history: CommitHistory,
    collections: CollectionRegistry,
    /// Serializes the SSI-lite check + commit-history append + coordinator
    /// decision append across every partition. Held for the full
    /// single-partition commit and the Phase-2 decision of 2PC: see
    /// DESIGN.md for why this crate trades cross-partition commit
    /// parallelism for a simpler, still-correct, single mutex.
    commit_mutex: Mutex<()>,
    worker_pool: WorkerPool,
    memory_used: AtomicU64,
}

impl LogicalDB {
    pub fn open(name: &str, db_id: u64, data_dir: &Path, wal_dir: &Path, config: EngineConfig) -> Result<Self> {
        let data_path = data_dir.join("data");
        let wal_path = wal_dir.join("wal").join(name);
        std::fs::create_dir_all(&data_path)?;
        std::fs::create_dir_all(&wal_path)?;

        let mut partitions = Vec::with_capacity(config.num_partitions);
        for id in 0..config.num_partitions {
            partitions.push(Arc::new(Partition::open(id, &data_path, &wal_path, name, &config)?));
        }

        // Load each partition's persisted index snapshot, if any, to
        // pre-populate its in-memory index and establish the tx_id floor
        // below which recovery can skip re-applying WAL records.
        let mut floors = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            match partition.load_index_snapshot()? {
                Some((floor, entries)) => {
                    for (collection, _, version) in entries {
                        partition.index.set(&collection, version);
                    }
                    floors.push(floor);
                }
                None => floors.push(0),
            }
        }

        let coordinator = CoordinatorLog::open(wal_path.join("coordinator.log"))?;
        let report = recovery::recover(&coordinator, &partitions, &floors)?;
        eprintln!(
            "[partitiondb] '{name}' recovered: {} committed, {} aborted, {} in-doubt resolved, {} already materialized, next_tx_id={}",
            report.committed_tx_count,
            report.aborted_tx_count,
            report.in_doubt_resolved_count,
            report.already_materialized_count,
            report.next_tx_id
        );

        let floor = report.next_tx_id.saturating_sub(1);
        let allocator = Arc::new(MvccAllocator::new());
        allocator.seed(report.next_tx_id, floor);

        let mut memory_used = 0u64;
        for partition in &partitions {
            for (_, _, version) in partition.index.all_live(floor) {
                memory_used += version.payload_len as u64;
                partition.add_bytes(version.payload_len as i64);
            }
        }

        let collections = CollectionRegistry::open(&wal_path)?;
        let worker_pool = WorkerPool::new(config.worker_threads, config.task_queue_capacity);
        let ssi_history_capacity = config.ssi_history_capacity;

        Ok(Self {
            name: name.to_string(),
            db_id,
            tx_manager: TransactionManager::new(allocator.clone()),
            allocator,
            partitions,
            coordinator,
            commit_history: CommitHistory::new(ssi_history_capacity),
            collections,
            commit_mutex: Mutex::new(()),
            worker_pool,
            memory_used: AtomicU64::new(memory_used),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_id(&self) -> u64 {
        self.db_id
    }

    fn partition_for(&self, doc_id: DocId) -> PartitionId {
        (doc_id as usize) % self.partitions.len()
    }

    /// Submits an arbitrary job to this DB's worker pool. Used for
    /// background maintenance (compaction); the synchronous Core API below
    /// deliberately does *not* route through this pool for every call — see
    /// DESIGN.md for the rationale.
    pub fn submit_task<F: FnOnce() + Send + 'static>(&self, job: F) -> Result<()> {
        self.worker_pool.submit(job)
    }

    // ---- Collections --------------------------------------------------

    pub fn create_collection(&self, name: &str) -> Result<()> {
        self.collections.create(name)
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.require_exists(name)?;
        let snapshot = self.allocator.current_snapshot();
        let empty = self.partitions.iter().all(|p| p.index.collection_is_empty(name, snapshot));
        if !empty {
            return Err(EngineError::CollectionNotEmpty(name.to_string()));
        }
        self.collections.delete(name)
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.collections.list()
    }

    // ---- Non-transactional sugar ---------------------------------------

    pub fn create(&self, collection: &str, doc_id: DocId, payload: Vec<u8>) -> Result<()> {
        self.auto_commit(collection, OpType::Create, doc_id, payload)
    }

    pub fn update(&self, collection: &str, doc_id: DocId, payload: Vec<u8>) -> Result<()> {
        self.auto_commit(collection, OpType::Update, doc_id, payload)
    }

    pub fn delete(&self, collection: &str, doc_id: DocId) -> Result<()> {
        self.auto_commit(collection, OpType::Delete, doc_id, Vec::new())
    }

    pub fn patch(&self, collection: &str, doc_id: DocId, ops: &[PatchOp]) -> Result<()> {
        let payload = serde_json::to_vec(ops)?;
        self.auto_commit(collection, OpType::Patch, doc_id, payload)
    }

    pub fn read(&self, collection: &str, doc_id: DocId) -> Result<Vec<u8>> {
        self.collections.require_exists(collection)?;
        let snapshot = self.allocator.current_snapshot();
        self.read_raw_at_snapshot(collection, doc_id, snapshot)?
            .ok_or_else(|| EngineError::NotFound(format!("{collection}/{doc_id}")))
    }

    fn auto_commit(&self, collection: &str, op_type: OpType, doc_id: DocId, payload: Vec<u8>) -> Result<()> {
        let tx_id = self.begin();
        if let Err(e) = self.add_op_to_tx(tx_id, collection, op_type, doc_id, payload) {
            self.rollback(tx_id)?;
            return Err(e);
        }
        self.commit(tx_id)
    }

    // ---- Transactional API ----------------------------------------------

    pub fn begin(&self) -> TxId {
        self.tx_manager.begin()
    }

    pub fn add_op_to_tx(&self, tx_id: TxId, collection: &str, op_type: OpType, doc_id: DocId, payload: Vec<u8>) -> Result<()> {
        self.collections.require_exists(collection)?;
        if matches!(op_type, OpType::Create | OpType::Update)
            && payload.len() > self.config.max_payload_bytes as usize
        {
            return Err(EngineError::PayloadTooLarge {
                len: payload.len(),
                cap: self.config.max_payload_bytes as usize,
            });
        }
        self.tx_manager.add_op(
            tx_id,
            PendingOp {
                collection: collection.to_string(),
                doc_id,
                op_type,
                payload,
            },
        )
    }

    pub fn read_in_tx(&self, tx_id: TxId, collection: &str, doc_id: DocId) -> Result<Vec<u8>> {
        let tx = self.tx_manager.snapshot_of(tx_id)?;
        self.tx_manager.record_read(tx_id, collection, doc_id)?;
        self.resolve_in_tx_payload(&tx, collection, doc_id)?
            .ok_or_else(|| EngineError::NotFound(format!("{collection}/{doc_id}")))
    }

    /// Replays `tx`'s own buffered ops touching `(collection, doc_id)` over
    /// the base snapshot read, applying any buffered Patch ops in order: a
    /// pending create/update/patch shadows the base value with that
    /// buffered payload after patch application.
    fn resolve_in_tx_payload(&self, tx: &Transaction, collection: &str, doc_id: DocId) -> Result<Option<Vec<u8>>> {
        let mut current = self.read_raw_at_snapshot(collection, doc_id, tx.snapshot_tx_id)?;
        for op in &tx.ops {
            if op.collection != collection || op.doc_id != doc_id {
                continue;
            }
            match op.op_type {
                OpType::Create | OpType::Update => current = Some(op.payload.clone()),
                OpType::Delete => current = None,
                OpType::Patch => {
                    let base = current
                        .clone()
                        .ok_or_else(|| EngineError::NotFound(format!("{collection}/{doc_id}")))?;
                    let patch_ops: Vec<PatchOp> = serde_json::from_slice(&op.payload)?;
                    current = Some(patch::apply_patch(&base, &patch_ops)?);
                }
                OpType::Commit | OpType::Abort => unreachable!("never buffered as a pending op"),
            }
        }
        Ok(current)
    }

    fn read_raw_at_snapshot(&self, collection: &str, doc_id: DocId, snapshot: TxId) -> Result<Option<Vec<u8>>> {
        let partition = &self.partitions[self.partition_for(doc_id)];
        match partition.index.get(collection, doc_id, snapshot) {
            Some(version) => Ok(Some(partition.data_file.read(version.data_offset, version.payload_len)?)),
            None => Ok(None),
        }
    }

    pub fn rollback(&self, tx_id: TxId) -> Result<()> {
        self.tx_manager.take_open(tx_id)?;
        self.allocator.resolve(tx_id);
        Ok(())
    }

    /// Commits `tx_id`, routing to the single-partition fast path or full
    /// two-phase commit depending on how many distinct partitions its ops
    /// touch. The tx_id's watermark is resolved on every exit path, success
    /// or failure, since its fate (committed or aborted) is determined
    /// either way.
    pub fn commit(&self, tx_id: TxId) -> Result<()> {
        let tx = self.tx_manager.take_open(tx_id)?;
        let result = if tx.ops.is_empty() {
            Ok(())
        } else {
            let partitions_touched: BTreeSet<PartitionId> =
                tx.ops.iter().map(|op| self.partition_for(op.doc_id)).collect();
            if partitions_touched.len() == 1 {
                self.commit_single_partition(&tx, *partitions_touched.iter().next().unwrap())
            } else {
                self.commit_two_phase(&tx, partitions_touched.into_iter().collect())
            }
        };
        self.allocator.resolve(tx_id);
        result
    }

    fn write_set_of(tx: &Transaction) -> HashSet<Key> {
        tx.ops.iter().map(|op| (op.collection.clone(), op.doc_id)).collect()
    }

    fn commit_single_partition(&self, tx: &Transaction, partition_id: PartitionId) -> Result<()> {
        let partition = &self.partitions[partition_id];
        let write_set = Self::write_set_of(tx);

        let _commit_guard = self.commit_mutex.lock();
        if has_conflict(&self.commit_history, tx.snapshot_tx_id, &tx.read_set, &write_set) {
            return Err(EngineError::SerializationFailure);
        }

        let _write_guard = partition.lock_write();
        let plan = self.plan_ops(partition, tx.snapshot_tx_id, &tx.ops)?;
        self.check_memory_budget(plan.bytes_delta)?;

        let mut wal_records = self.build_wal_records(tx.tx_id, &plan);
        wal_records.push(self.commit_marker(tx.tx_id));
        partition.wal.append_batch(&mut wal_records, self.config.durability)?;

        self.apply_plan(partition, tx.tx_id, &plan);
        partition.add_bytes(plan.bytes_delta);
        self.bump_memory(plan.bytes_delta);
        drop(_write_guard);

        self.commit_history.push(CommitRecord {
            tx_id: tx.tx_id,
            read_set: tx.read_set.clone(),
            write_set,
        });
        Ok(())
    }

    fn commit_two_phase(&self, tx: &Transaction, partition_ids: Vec<PartitionId>) -> Result<()> {
        let mut prepared: Vec<(PartitionId, Plan)> = Vec::new();
        let mut any_wal_written = false;

        for pid in partition_ids {
            let partition = &self.partitions[pid];
            let ops_for_partition: Vec<PendingOp> = tx
                .ops
                .iter()
                .filter(|op| self.partition_for(op.doc_id) == pid)
                .cloned()
                .collect();

            let guard = partition.lock_write();
            let planned = self
                .plan_ops(partition, tx.snapshot_tx_id, &ops_for_partition)
                .and_then(|plan| {
                    self.check_memory_budget(plan.bytes_delta)?;
                    Ok(plan)
                });
            match planned {
                Ok(plan) => {
                    let mut wal_records = self.build_wal_records(tx.tx_id, &plan);
                    let result = partition.wal.append_batch(&mut wal_records, self.config.durability);
                    drop(guard);
                    match result {
                        Ok(()) => {
                            any_wal_written = true;
                            prepared.push((pid, plan));
                        }
                        Err(e) => {
                            self.abort_prepared(tx.tx_id, &prepared, any_wal_written)?;
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    drop(guard);
                    self.abort_prepared(tx.tx_id, &prepared, any_wal_written)?;
                    return Err(e);
                }
            }
        }

        let write_set = Self::write_set_of(tx);
        let _commit_guard = self.commit_mutex.lock();
        if has_conflict(&self.commit_history, tx.snapshot_tx_id, &tx.read_set, &write_set) {
            self.abort_prepared(tx.tx_id, &prepared, any_wal_written)?;
            return Err(EngineError::SerializationFailure);
        }

        self.coordinator.append(tx.tx_id, Decision::Commit)?;
        for (pid, plan) in &prepared {
            let partition = &self.partitions[*pid];
            let guard = partition.lock_write();
            let mut commit_record = vec![self.commit_marker(tx.tx_id)];
            partition.wal.append_batch(&mut commit_record, self.config.durability)?;
            self.apply_plan(partition, tx.tx_id, plan);
            partition.add_bytes(plan.bytes_delta);
            self.bump_memory(plan.bytes_delta);
            drop(guard);
        }

        self.commit_history.push(CommitRecord {
            tx_id: tx.tx_id,
            read_set: tx.read_set.clone(),
            write_set,
        });
        Ok(())
    }

    /// Phase-1 abort path: if no partition ever received a WAL record for
    /// this tx, fail with no coordinator write at all. Otherwise, append a
    /// coordinator Abort decision and an Abort marker to every partition
    /// that was prepared.
    fn abort_prepared(&self, tx_id: TxId, prepared: &[(PartitionId, Plan)], any_wal_written: bool) -> Result<()> {
        if !any_wal_written {
            return Ok(());
        }
        self.coordinator.append(tx_id, Decision::Abort)?;
        for (pid, _) in prepared {
            let partition = &self.partitions[*pid];
            let guard = partition.lock_write();
            let mut abort_record = vec![WalRecord {
                lsn: 0,
                tx_id,
                db_id: self.db_id,
                collection: String::new(),
                op_type: OpType::Abort,
                doc_id: 0,
                payload: Vec::new(),
            }];
            partition.wal.append_batch(&mut abort_record, self.config.durability)?;
            drop(guard);
        }
        Ok(())
    }

    fn commit_marker(&self, tx_id: TxId) -> WalRecord {
        WalRecord {
            lsn: 0,
            tx_id,
            db_id: self.db_id,
            collection: String::new(),
            op_type: OpType::Commit,
            doc_id: 0,
            payload: Vec::new(),
        }
    }

    fn build_wal_records(&self, tx_id: TxId, plan: &Plan) -> Vec<WalRecord> {
        plan.ops
            .iter()
            .map(|op| WalRecord {
                lsn: 0,
                tx_id,
                db_id: self.db_id,
                collection: op.collection.clone(),
                op_type: op.op_type,
                doc_id: op.doc_id,
                payload: op.payload.clone().unwrap_or_default(),
            })
            .collect()
    }

    fn apply_plan(&self, partition: &Partition, tx_id: TxId, plan: &Plan) {
        for op in &plan.ops {
            match &op.payload {
                Some(payload) => {
                    if let Ok(offset) = partition.data_file.append(payload) {
                        let version = DocumentVersion::new(op.doc_id, tx_id, offset, payload.len() as u32);
                        partition.index.set(&op.collection, version);
                    }
                }
                None => {
                    if let Some(mut existing) = partition.index.get_raw(&op.collection, op.doc_id) {
                        existing.deleted_tx_id = Some(tx_id);
                        partition.index.set(&op.collection, existing);
                    }
                }
            }
        }
    }

    /// Validates `ops` against `partition`'s current state overlaid with
    /// earlier ops in the same batch, producing the data-file/WAL plan.
    /// Ops are grouped by doc_id: later ops in the batch see the effect of
    /// earlier ones, not just the pre-transaction state.
    fn plan_ops(&self, partition: &Partition, snapshot: TxId, ops: &[PendingOp]) -> Result<Plan> {
        use std::collections::HashMap;

        let mut local: HashMap<Key, Option<Vec<u8>>> = HashMap::new();
        let mut out = Vec::with_capacity(ops.len());
        let mut bytes_delta: i64 = 0;

        for op in ops {
            let key: Key = (op.collection.clone(), op.doc_id);
            let overlay = local.get(&key);
            let (exists, old_len): (bool, u32) = match overlay {
                Some(Some(bytes)) => (true, bytes.len() as u32),
                Some(None) => (false, 0),
                None => match partition
                    .index
                    .get_raw(&op.collection, op.doc_id)
                    .filter(|v| v.visible_at(snapshot))
                {
                    Some(v) => (true, v.payload_len),
                    None => (false, 0),
                },
            };

            match op.op_type {
                OpType::Create => {
                    if exists {
                        return Err(EngineError::AlreadyExists(format!("{}/{}", op.collection, op.doc_id)));
                    }
                    self.check_payload_size(op.payload.len())?;
                    bytes_delta += op.payload.len() as i64;
                    local.insert(key, Some(op.payload.clone()));
                    out.push(PlannedOp {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id,
                        op_type: OpType::Create,
                        payload: Some(op.payload.clone()),
                    });
                }
                OpType::Update => {
                    if !exists {
                        return Err(EngineError::NotFound(format!("{}/{}", op.collection, op.doc_id)));
                    }
                    self.check_payload_size(op.payload.len())?;
                    bytes_delta += op.payload.len() as i64 - old_len as i64;
                    local.insert(key, Some(op.payload.clone()));
                    out.push(PlannedOp {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id,
                        op_type: OpType::Update,
                        payload: Some(op.payload.clone()),
                    });
                }
                OpType::Delete => {
                    if !exists {
                        return Err(EngineError::NotFound(format!("{}/{}", op.collection, op.doc_id)));
                    }
                    bytes_delta -= old_len as i64;
                    local.insert(key, None);
                    out.push(PlannedOp {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id,
                        op_type: OpType::Delete,
                        payload: None,
                    });
                }
                OpType::Patch => {
                    if !exists {
                        return Err(EngineError::NotFound(format!("{}/{}", op.collection, op.doc_id)));
                    }
                    let current_bytes = match overlay {
                        Some(Some(bytes)) => bytes.clone(),
                        _ => {
                            let base = partition
                                .index
                                .get_raw(&op.collection, op.doc_id)
                                .expect("exists=true guarantees a base version when not locally overridden");
                            partition.data_file.read(base.data_offset, base.payload_len)?
                        }
                    };
                    let patch_ops: Vec<PatchOp> = serde_json::from_slice(&op.payload)?;
                    let new_payload = patch::apply_patch(&current_bytes, &patch_ops)?;
                    self.check_payload_size(new_payload.len())?;
                    bytes_delta += new_payload.len() as i64 - old_len as i64;
                    local.insert(key, Some(new_payload.clone()));
                    out.push(PlannedOp {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id,
                        op_type: OpType::Patch,
                        payload: Some(new_payload),
                    });
                }
                OpType::Commit | OpType::Abort => unreachable!("never buffered as a pending op"),
            }
        }

        Ok(Plan { ops: out, bytes_delta })
    }

    fn check_payload_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_payload_bytes as usize {
            return Err(EngineError::PayloadTooLarge {
                len,
                cap: self.config.max_payload_bytes as usize,
            });
        }
        Ok(())
    }

    fn check_memory_budget(&self, delta: i64) -> Result<()> {
        if delta <= 0 {
            return Ok(());
        }
        let requested = self.memory_used.load(Ordering::SeqCst) + delta as u64;
        if requested > self.config.max_memory_bytes {
            return Err(EngineError::MemoryLimit {
                requested,
                budget: self.config.max_memory_bytes,
            });
        }
        Ok(())
    }

    fn bump_memory(&self, delta: i64) {
        if delta >= 0 {
            self.memory_used.fetch_add(delta as u64, Ordering::SeqCst);
        } else {
            self.memory_used.fetch_sub((-delta) as u64, Ordering::SeqCst);
        }
    }

    // ---- Query ----------------------------------------------------------

    pub fn execute_query(&self, collection: &str, query: &Query) -> Result<QueryResult> {
        self.collections.require_exists(collection)?;
        let snapshot = self.allocator.current_snapshot();
        let cancel = CancelToken::with_timeout(self.config.query_timeout);
        query::execute_query(&self.partitions, collection, query, snapshot, &self.config, &cancel)
    }

    // ---- Checkpoint -------------------------------------------------------

    /// Declares a checkpoint and trims WAL segments when the cumulative WAL
    /// size crosses the configured threshold. Every partition's index is
    /// snapshotted before any WAL is trimmed, so the snapshot becomes the
    /// authoritative record of already-materialized state once the WAL
    /// covering it is gone. Also runs the compaction check on every call,
    /// independent of whether a checkpoint was declared. Returns whether a
    /// checkpoint was declared.
    pub fn checkpoint_if_needed(&self) -> Result<bool> {
        self.maybe_compact()?;

        let mut total = 0u64;
        for partition in &self.partitions {
            total += partition.wal.total_size_bytes()?;
        }
        if total < self.config.checkpoint_wal_size_bytes {
            return Ok(false);
        }
        eprintln!(
            "[partitiondb] '{}': wal size {total} bytes crosses checkpoint threshold, declaring checkpoint",
            self.name
        );

        let snapshot = self.allocator.current_snapshot();
        for partition in &self.partitions {
            partition.save_index_snapshot(snapshot)?;
        }

        if self.config.trim_after_checkpoint {
            for partition in &self.partitions {
                partition.wal.trim_before(self.config.keep_wal_segments)?;
            }
        }
        Ok(true)
    }

    /// Compacts any partition whose data file has grown past
    /// `compaction_size_threshold_bytes` AND whose dead-byte ratio (bytes no
    /// longer live, divided by the file's total size) has crossed
    /// `compaction_tombstone_ratio`. Dispatched onto the worker pool and
    /// awaited, so the caller still sees a synchronous call while the
    /// actual copy work happens off this thread.
    fn maybe_compact(&self) -> Result<()> {
        let snapshot = self.allocator.current_snapshot();
        for partition in &self.partitions {
            let size = partition.data_file.size()?;
            if size < self.config.compaction_size_threshold_bytes {
                continue;
            }
            let dead_ratio = 1.0 - (partition.bytes_in_use() as f64 / size.max(1) as f64);
            if dead_ratio < self.config.compaction_tombstone_ratio {
                continue;
            }
            eprintln!(
                "[partitiondb] '{}' partition {}: data file {size} bytes, dead ratio {dead_ratio:.2}, compacting",
                self.name, partition.id
            );
            let part = partition.clone();
            self.worker_pool.submit_and_wait(move || part.compact(snapshot))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<DbStats> {
        let mut wal_bytes = 0u64;
        for partition in &self.partitions {
            wal_bytes += partition.wal.total_size_bytes()?;
        }
        Ok(DbStats {
            db_id: self.db_id,
            live_tx_count: self.tx_manager.active_count(),
            wal_bytes,
            memory_used: self.memory_used.load(Ordering::SeqCst),
            partition_count: self.partitions.len(),
        })
    }
}

/// Creates a fresh `LogicalDB` rooted at `data_dir`/`wal_dir`, registering it
/// in `catalog` first. Kept as a free function (rather than a `LogicalDB`
/// constructor) since it needs the catalog, which `engine.rs` owns, not
/// `LogicalDB` itself.
pub fn create_and_open(catalog: &Catalog, name: &str, data_dir: &Path, wal_dir: &Path, config: EngineConfig) -> Result<LogicalDB> {
    let db_id = catalog.create_db(name)?;
    LogicalDB::open(name, db_id, data_dir, wal_dir, config)
}
