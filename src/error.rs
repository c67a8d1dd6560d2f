//! Error taxonomy for the engine.
//!
//! One `thiserror` enum covers every failure mode the Core API and its
//! subsystems can surface, paired with a crate-wide `Result` alias and
//! manual conversions for the handful of external error types that cross
//! into it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("memory limit exceeded: requested {requested}, budget {budget}")]
    MemoryLimit { requested: u64, budget: u64 },

    #[error("payload too large: {len} bytes exceeds cap of {cap} bytes")]
    PayloadTooLarge { len: usize, cap: usize },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotJsonObject,

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("invalid JSON pointer path: {0}")]
    InvalidPath(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("collection not empty: {0}")]
    CollectionNotEmpty(String),

    #[error("task queue full")]
    QueueFull,

    #[error("query timed out")]
    QueryTimeout,

    #[error("query memory limit exceeded: scanned {scanned} bytes, cap {cap} bytes")]
    QueryMemoryLimit { scanned: u64, cap: u64 },

    #[error("too many concurrent queries")]
    TooManyConcurrentQueries,

    #[error("serialization failure (SSI-lite conflict)")]
    SerializationFailure,

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transaction not found: {0}")]
    TxNotFound(u64),

    #[error("transaction already closed: {0}")]
    TxAlreadyClosed(u64),

    #[error("cross-partition operation unsupported: {0}")]
    CrossPartitionUnsupported(String),
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::CorruptRecord(format!("bincode: {e}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidJson(e.to_string())
    }
}
