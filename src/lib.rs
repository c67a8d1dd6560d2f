//! partitiondb: an embedded, multi-tenant document database engine with
//! partitioned write serialization, segmented WAL-based durability, MVCC
//! snapshot isolation, SSI-lite conflict detection, and two-phase commit
//! across partitions.
//!
//! Entry points: [`engine::Engine`] owns the on-disk catalog of logical
//! databases; [`db::LogicalDB`] is a single database's handle and Core API.

pub mod catalog;
pub mod checksum;
pub mod collection;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod index;
pub mod partition;
pub mod patch;
pub mod query;
pub mod storage;
pub mod txn;
pub mod types;
pub mod worker_pool;

pub use config::{DurabilityLevel, EngineConfig};
pub use db::{DbStats, LogicalDB};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use patch::PatchOp;
pub use query::{CancelToken, Query, QueryResult};
pub use types::{DocId, OpType, PartitionId, TxId};
