//! Sharded in-memory index: maps `(collection, doc_id)` to the current
//! `DocumentVersion`, sharded by a stable hash across `N` plain maps behind
//! independent `RwLock`s so unrelated keys rarely contend on the same lock.

use crate::types::{DocId, DocumentVersion, TxId};
use ahash::AHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

type Key = (String, DocId);

fn shard_for(num_shards: usize, collection: &str, doc_id: DocId) -> usize {
    let mut hasher = AHasher::default();
    collection.hash(&mut hasher);
    doc_id.hash(&mut hasher);
    (hasher.finish() as usize) % num_shards
}

pub struct ShardedIndex {
    shards: Vec<RwLock<HashMap<Key, DocumentVersion>>>,
}

impl ShardedIndex {
    pub fn new(num_shards: usize) -> Self {
        let mut shards = Vec::with_capacity(num_shards);
        for _ in 0..num_shards {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_index(&self, collection: &str, doc_id: DocId) -> usize {
        shard_for(self.shards.len(), collection, doc_id)
    }

    /// Returns the version at `(collection, doc_id)` iff it is visible at `snapshot`.
    pub fn get(&self, collection: &str, doc_id: DocId, snapshot: TxId) -> Option<DocumentVersion> {
        let idx = self.shard_index(collection, doc_id);
        let shard = self.shards[idx].read();
        shard
            .get(&(collection.to_string(), doc_id))
            .filter(|v| v.visible_at(snapshot))
            .copied()
    }

    /// Returns the raw entry regardless of visibility (used by the
    /// single-partition commit path to check "does a visible version
    /// exist" against the *current* value, and by recovery replay).
    pub fn get_raw(&self, collection: &str, doc_id: DocId) -> Option<DocumentVersion> {
        let idx = self.shard_index(collection, doc_id);
        self.shards[idx].read().get(&(collection.to_string(), doc_id)).copied()
    }

    /// Inserts or replaces the version for `(collection, doc_id)`. Must
    /// only be called while the owning partition's write mutex is held.
    pub fn set(&self, collection: &str, version: DocumentVersion) {
        let idx = self.shard_index(collection, version.doc_id);
        self.shards[idx]
            .write()
            .insert((collection.to_string(), version.doc_id), version);
    }

    pub fn remove(&self, collection: &str, doc_id: DocId) {
        let idx = self.shard_index(collection, doc_id);
        self.shards[idx].write().remove(&(collection.to_string(), doc_id));
    }

    /// Iterates every visible `(doc_id, DocumentVersion)` in `collection` at
    /// `snapshot`. Takes each shard's read lock briefly in turn; does not
    /// present a cross-shard-consistent snapshot — per-entry visibility
    /// under the single chosen `snapshot` is what guarantees correctness,
    /// not lock-step iteration.
    pub fn scan_visible(&self, collection: &str, snapshot: TxId) -> Vec<(DocId, DocumentVersion)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            for ((coll, doc_id), version) in guard.iter() {
                if coll == collection && version.visible_at(snapshot) {
                    out.push((*doc_id, *version));
                }
            }
        }
        out
    }

    /// All live (non-tombstoned-at-`snapshot`) entries across all
    /// collections, used by compaction to decide what to carry forward.
    pub fn all_live(&self, snapshot: TxId) -> Vec<(String, DocId, DocumentVersion)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            for ((coll, doc_id), version) in guard.iter() {
                if version.visible_at(snapshot) {
                    out.push((coll.clone(), *doc_id, *version));
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any live entry exists for `collection` (used by collection
    /// deletion's emptiness check).
    pub fn collection_is_empty(&self, collection: &str, snapshot: TxId) -> bool {
        self.shards.iter().all(|shard| {
            shard
                .read()
                .iter()
                .filter(|((coll, _), v)| coll == collection && v.visible_at(snapshot))
                .count()
                == 0
        })
    }
}
