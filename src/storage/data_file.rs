//! Per-partition append-only payload file.
//!
//! Record layout, little-endian: `[4: payload_len][N: payload][4: crc32][1: verified]`.
//! A record is durable only once its `verified` byte is on disk and fsynced;
//! anything else is treated as absent on read.

use crate::checksum;
use crate::error::{EngineError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;

const VERIFIED: u8 = 1;

/// Appends payload records and serves offset-addressed reads for one
/// partition's data file. All appends are serialized by the caller holding
/// the partition's write mutex; `DataFile` itself only guards the
/// underlying handle against concurrent readers vs. the single writer
/// using an internal mutex around the file cursor.
pub struct DataFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl DataFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `payload`, returning the byte offset of the `payload_len`
    /// field (the value stored in `DocumentVersion::data_offset`). Fsyncs
    /// before returning so the record is durable the moment the offset is
    /// handed back — the data file has no separate group-commit stage; it
    /// is appended first and made durable alongside the WAL record that
    /// references it.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        let crc = checksum::compute(payload);
        let mut buf = Vec::with_capacity(4 + payload.len() + 4 + 1);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.push(VERIFIED);

        let mut file = self.file.lock();
        let offset = file.metadata()?.len();
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(offset)
    }

    /// Reads the record at `(offset, payload_len)`, validating length, CRC,
    /// and the `verified` byte. Returns `CorruptRecord` on any mismatch; the
    /// caller surfaces that to the read/query path rather than attempting
    /// repair itself.
    pub fn read(&self, offset: u64, payload_len: u32) -> Result<Vec<u8>> {
        let total = 4usize + payload_len as usize + 4 + 1;
        let mut raw = vec![0u8; total];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut raw)
                .map_err(|e| EngineError::CorruptRecord(format!("short read at {offset}: {e}")))?;
        }

        let stored_len = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if stored_len != payload_len {
            return Err(EngineError::CorruptRecord(format!(
                "length mismatch at offset {offset}: index says {payload_len}, file says {stored_len}"
            )));
        }
        let payload = raw[4..4 + payload_len as usize].to_vec();
        let crc_bytes = &raw[4 + payload_len as usize..4 + payload_len as usize + 4];
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        checksum::verify(&payload, stored_crc)?;

        let verified = raw[total - 1];
        if verified != VERIFIED {
            return Err(EngineError::CorruptRecord(format!(
                "record at offset {offset} is not marked verified"
            )));
        }
        Ok(payload)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Refreshes the held file handle by reopening `path`. Needed after an
    /// external rename replaces the file at this path with a different
    /// inode (e.g. compaction's atomic swap) — the old handle would keep
    /// writing to the now-unlinked original.
    pub fn reopen(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        *self.file.lock() = file;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let df = DataFile::open(dir.path().join("p0.data")).unwrap();
        let off = df.append(b"{\"a\":1}").unwrap();
        let got = df.read(off, 7).unwrap();
        assert_eq!(got, b"{\"a\":1}");
    }

    #[test]
    fn empty_payload_roundtrips() {
        let dir = tempdir().unwrap();
        let df = DataFile::open(dir.path().join("p0.data")).unwrap();
        let off = df.append(b"").unwrap();
        assert_eq!(df.read(off, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p0.data");
        let df = DataFile::open(&path).unwrap();
        let off = df.append(b"hello").unwrap();
        drop(df);

        // Flip a payload byte directly on disk, bypassing the engine.
        let mut raw = std::fs::read(&path).unwrap();
        raw[4] ^= 0xFF;
        std::fs::write(&path, raw).unwrap();

        let df = DataFile::open(&path).unwrap();
        assert!(df.read(off, 5).is_err());
    }

    #[test]
    fn appends_never_overwrite() {
        let dir = tempdir().unwrap();
        let df = DataFile::open(dir.path().join("p0.data")).unwrap();
        let off1 = df.append(b"first").unwrap();
        let off2 = df.append(b"second").unwrap();
        assert_ne!(off1, off2);
        assert_eq!(df.read(off1, 5).unwrap(), b"first");
        assert_eq!(df.read(off2, 6).unwrap(), b"second");
    }
}
