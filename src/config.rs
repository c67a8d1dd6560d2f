//! Engine configuration: a serde-derived config struct, a small enum for
//! the durability knob, and named preset constructors (`durable`,
//! `testing`) rather than a single default with scattered overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durability policy for WAL / coordinator-log fsync.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// fsync on every group commit before acknowledging the caller.
    Sync,
    /// fsync on a timer (`group_commit_interval`); caller may return before
    /// the background flush has run.
    Periodic,
    /// never fsync explicitly; rely on OS page cache eviction. Test-only.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of partitions a logical DB is sharded into. `doc_id mod
    /// num_partitions` selects the owning partition.
    pub num_partitions: usize,

    /// Number of index shards per partition.
    pub num_shards_per_partition: usize,

    pub durability: DurabilityLevel,

    /// Group-commit window: pending WAL appends younger than this are
    /// batched into one fsync.
    #[serde(with = "duration_millis")]
    pub group_commit_interval: Duration,

    /// Ceiling on the number of records folded into a single group commit.
    pub group_commit_max_batch: usize,

    /// Active WAL segment rotates once it exceeds this size.
    pub wal_segment_size_bytes: u64,

    /// Cumulative WAL size that triggers a checkpoint declaration.
    pub checkpoint_wal_size_bytes: u64,

    /// Number of segments behind the checkpoint lsn to retain.
    pub keep_wal_segments: usize,

    pub trim_after_checkpoint: bool,

    /// Per-record payload cap.
    pub max_payload_bytes: u32,

    /// Per-logical-DB live-payload byte budget.
    pub max_memory_bytes: u64,

    /// Per-query bytes-scanned cap.
    pub max_query_memory_bytes: u64,

    /// Row-count cap a query's `limit` is clamped to.
    pub max_query_limit: usize,

    pub query_timeout: Duration,

    pub max_concurrent_queries: usize,

    /// Worker-pool size, used for background maintenance tasks such as
    /// compaction rather than the synchronous Core API hot path.
    pub worker_threads: usize,

    /// Bounded task-queue capacity; beyond this, enqueue returns QueueFull.
    pub task_queue_capacity: usize,

    /// Bounded commit-history ring size used by SSI-lite conflict detection.
    pub ssi_history_capacity: usize,

    /// Data-file compaction triggers: compaction runs once a partition's
    /// data file exceeds this many bytes AND its dead-byte ratio (bytes
    /// occupied by tombstoned/superseded versions, divided by file size)
    /// exceeds `compaction_tombstone_ratio`.
    pub compaction_size_threshold_bytes: u64,
    pub compaction_tombstone_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_partitions: 8,
            num_shards_per_partition: 256,
            durability: DurabilityLevel::Sync,
            group_commit_interval: Duration::from_millis(1),
            group_commit_max_batch: 256,
            wal_segment_size_bytes: 64 * 1024 * 1024,
            checkpoint_wal_size_bytes: 256 * 1024 * 1024,
            keep_wal_segments: 2,
            trim_after_checkpoint: true,
            max_payload_bytes: 16 * 1024 * 1024,
            max_memory_bytes: 1024 * 1024 * 1024,
            max_query_memory_bytes: 100 * 1024 * 1024,
            max_query_limit: 10_000,
            query_timeout: Duration::from_secs(30),
            max_concurrent_queries: 64,
            worker_threads: 4,
            task_queue_capacity: 4096,
            ssi_history_capacity: 100_000,
            compaction_size_threshold_bytes: 512 * 1024 * 1024,
            compaction_tombstone_ratio: 0.5,
        }
    }
}

impl EngineConfig {
    /// Small, fast-fsyncing config for unit/integration tests.
    pub fn testing() -> Self {
        Self {
            num_partitions: 2,
            num_shards_per_partition: 8,
            durability: DurabilityLevel::Sync,
            group_commit_interval: Duration::from_micros(100),
            group_commit_max_batch: 16,
            wal_segment_size_bytes: 1024 * 1024,
            checkpoint_wal_size_bytes: 4 * 1024 * 1024,
            keep_wal_segments: 1,
            trim_after_checkpoint: true,
            max_payload_bytes: 1024 * 1024,
            max_memory_bytes: 64 * 1024 * 1024,
            max_query_memory_bytes: 8 * 1024 * 1024,
            max_query_limit: 1000,
            query_timeout: Duration::from_secs(5),
            max_concurrent_queries: 8,
            worker_threads: 2,
            task_queue_capacity: 256,
            ssi_history_capacity: 1024,
            compaction_size_threshold_bytes: 8 * 1024 * 1024,
            compaction_tombstone_ratio: 0.5,
        }
    }

    /// Maximum durability, minimum latitude for data loss.
    pub fn durable() -> Self {
        Self {
            durability: DurabilityLevel::Sync,
            group_commit_max_batch: 1,
            ..Self::default()
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_config_is_small() {
        let cfg = EngineConfig::testing();
        assert_eq!(cfg.num_partitions, 2);
        assert!(cfg.max_memory_bytes < EngineConfig::default().max_memory_bytes);
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_partitions, cfg.num_partitions);
    }
}
