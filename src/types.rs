//! Core newtypes shared across the engine: document/transaction identifiers,
//! collection names, and the `DocumentVersion` index entry.

use serde::{Deserialize, Serialize};

/// Document identifier, unique within a collection (routes to a partition
/// via `doc_id mod partition_count`).
pub type DocId = u64;

/// Transaction identifier, globally monotonic within a logical DB.
pub type TxId = u64;

/// Partition identifier, `0..partition_count`.
pub type PartitionId = usize;

/// Log sequence number, monotonic within a single partition's WAL.
pub type Lsn = u64;

/// Maximum collection/database name length in bytes.
pub const MAX_NAME_BYTES: usize = 64;

/// The collection every logical DB starts with; it cannot be deleted.
pub const DEFAULT_COLLECTION: &str = "_default";

/// Validates a collection or database name: UTF-8 (guaranteed by `&str`),
/// non-empty, at most `MAX_NAME_BYTES` bytes, and must not contain `/`,
/// `\`, `..`, or a NUL byte (these all risk escaping the directory a
/// name is used to build a path component under).
pub fn validate_name(name: &str) -> Result<(), crate::error::EngineError> {
    use crate::error::EngineError;

    if name.is_empty() {
        return Err(EngineError::InvalidName("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(EngineError::InvalidName(format!(
            "name '{name}' exceeds {MAX_NAME_BYTES} bytes"
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return Err(EngineError::InvalidName(format!(
            "name '{name}' contains a reserved character (/, \\, .. or NUL)"
        )));
    }
    Ok(())
}

/// An index entry describing a document's current live or tombstoned
/// version. Invariant: `created_tx_id <= deleted_tx_id` when both are
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub doc_id: DocId,
    pub created_tx_id: TxId,
    pub deleted_tx_id: Option<TxId>,
    pub data_offset: u64,
    pub payload_len: u32,
}

impl DocumentVersion {
    pub fn new(doc_id: DocId, created_tx_id: TxId, data_offset: u64, payload_len: u32) -> Self {
        Self {
            doc_id,
            created_tx_id,
            deleted_tx_id: None,
            data_offset,
            payload_len,
        }
    }

    /// Visibility predicate: visible to `snapshot` iff `created_tx_id <=
    /// snapshot` and (`deleted_tx_id` absent or `> snapshot`).
    pub fn visible_at(&self, snapshot: TxId) -> bool {
        self.created_tx_id <= snapshot
            && self.deleted_tx_id.map(|d| d > snapshot).unwrap_or(true)
    }

    pub fn is_tombstoned(&self) -> bool {
        self.deleted_tx_id.is_some()
    }
}

/// WAL / op-type discriminant. Numeric values are an internal choice, not
/// part of any external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpType {
    Create = 1,
    // 2 is reserved for a future read-intent marker and intentionally never written.
    Update = 3,
    Delete = 4,
    Patch = 5,
    Commit = 6,
    Abort = 7,
}

impl OpType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OpType::Create),
            3 => Some(OpType::Update),
            4 => Some(OpType::Delete),
            5 => Some(OpType::Patch),
            6 => Some(OpType::Commit),
            7 => Some(OpType::Abort),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_rule() {
        let mut v = DocumentVersion::new(1, 10, 0, 5);
        assert!(!v.visible_at(9));
        assert!(v.visible_at(10));
        assert!(v.visible_at(20));
        v.deleted_tx_id = Some(15);
        assert!(v.visible_at(14));
        assert!(!v.visible_at(15));
        assert!(!v.visible_at(20));
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("orders").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("a..b").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
    }
}
