//! Partition: the unit of write serialization. Owns a data file, a
//! segmented WAL, a sharded index, a write mutex, and a live-payload byte
//! counter, plus the compaction routine and index-snapshot persistence
//! that keep the data file and recovery bounded over the partition's
//! lifetime.

use crate::checksum;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::ShardedIndex;
use crate::storage::{DataFile, PartitionWal};
use crate::types::{DocId, DocumentVersion, PartitionId, TxId};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Partition {
    pub id: PartitionId,
    pub data_file: DataFile,
    pub wal: PartitionWal,
    pub index: ShardedIndex,
    /// Held by exactly one worker for the duration of a commit on this
    /// partition, and for the full duration of compaction.
    write_mutex: Mutex<()>,
    bytes_in_use: AtomicU64,
}

/// RAII guard for the partition write mutex, acquired in ascending
/// partition-id order by multi-partition commits to keep the protocol
/// deadlock-free.
pub struct WriteGuard<'a>(parking_lot::MutexGuard<'a, ()>);

#[derive(serde::Serialize, serde::Deserialize)]
struct IndexSnapshot {
    floor: TxId,
    entries: Vec<(String, DocId, DocumentVersion)>,
}

impl Partition {
    pub fn open<P: AsRef<Path>>(
        id: PartitionId,
        data_dir: P,
        wal_dir: P,
        db_name: &str,
        config: &EngineConfig,
    ) -> Result<Self> {
        let data_path = data_dir.as_ref().join(format!("{db_name}_p{id}.data"));
        let data_file = DataFile::open(data_path)?;
        let wal = PartitionWal::open(wal_dir.as_ref(), id, config.wal_segment_size_bytes)?;
        let index = ShardedIndex::new(config.num_shards_per_partition);
        Ok(Self {
            id,
            data_file,
            wal,
            index,
            write_mutex: Mutex::new(()),
            bytes_in_use: AtomicU64::new(0),
        })
    }

    /// Blocking (non-trylock) acquisition of this partition's write mutex.
    pub fn lock_write(&self) -> WriteGuard<'_> {
        WriteGuard(self.write_mutex.lock())
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.bytes_in_use.load(Ordering::SeqCst)
    }

    pub fn add_bytes(&self, delta: i64) {
        if delta >= 0 {
            self.bytes_in_use.fetch_add(delta as u64, Ordering::SeqCst);
        } else {
            self.bytes_in_use.fetch_sub((-delta) as u64, Ordering::SeqCst);
        }
    }

    fn index_snapshot_path(&self) -> PathBuf {
        self.data_file.path().with_extension("index_snapshot")
    }

    fn compact_tmp_path(&self) -> PathBuf {
        let mut s = self.data_file.path().as_os_str().to_os_string();
        s.push(".compact");
        PathBuf::from(s)
    }

    /// Persists the live index as of `floor` to a sibling file, atomically
    /// (write to a temp path, then rename over the snapshot path). A
    /// snapshot is the authoritative record of already-materialized state
    /// once the WAL covering it has been trimmed, so recovery can skip
    /// re-applying anything at or below `floor`.
    pub fn save_index_snapshot(&self, floor: TxId) -> Result<()> {
        let entries = self.index.all_live(floor);
        let snapshot = IndexSnapshot { floor, entries };
        let bytes = bincode::serialize(&snapshot)?;

        let path = self.index_snapshot_path();
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Loads a previously saved index snapshot, if one exists and decodes
    /// cleanly. A missing or corrupt snapshot returns `None`, which tells
    /// the caller to fall back to a full WAL replay from the beginning.
    pub fn load_index_snapshot(&self) -> Result<Option<(TxId, Vec<(String, DocId, DocumentVersion)>)>> {
        let path = self.index_snapshot_path();
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match bincode::deserialize::<IndexSnapshot>(&bytes) {
            Ok(snap) => Ok(Some((snap.floor, snap.entries))),
            Err(e) => {
                eprintln!(
                    "[partitiondb] partition {}: ignoring corrupt index snapshot: {e}",
                    self.id
                );
                Ok(None)
            }
        }
    }

    /// Rewrites the data file to hold only payloads live at `snapshot`,
    /// reclaiming space occupied by tombstoned and superseded versions.
    /// Holds the write mutex for the entire operation: releasing it early
    /// (say, only around the final rename) would let a concurrent write
    /// append to the old file during the copy phase and then silently lose
    /// that write when the rename replaces it.
    pub fn compact(&self, snapshot: TxId) -> Result<()> {
        let _guard = self.lock_write();

        let live = self.index.all_live(snapshot);
        let tmp_data_path = self.compact_tmp_path();
        let tmp_data_file = DataFile::open(&tmp_data_path)?;

        let mut crc_builder = checksum::Builder::new();
        let mut relocations = Vec::with_capacity(live.len());
        for (collection, doc_id, version) in &live {
            let payload = self.data_file.read(version.data_offset, version.payload_len)?;
            crc_builder.update(&payload);
            let new_offset = tmp_data_file.append(&payload)?;
            let mut new_version = *version;
            new_version.doc_id = *doc_id;
            new_version.data_offset = new_offset;
            relocations.push((collection.clone(), new_version));
        }
        let aggregate_crc = crc_builder.finalize();
        tmp_data_file.append(&aggregate_crc.to_le_bytes())?;

        let data_path = self.data_file.path().to_path_buf();
        fs::rename(&tmp_data_path, &data_path)?;
        self.data_file.reopen()?;

        for (collection, version) in relocations {
            self.index.set(&collection, version);
        }

        self.save_index_snapshot(snapshot)
    }
}
