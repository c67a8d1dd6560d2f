//! Coordinator log: an append-only, per-logical-DB log of two-phase-commit
//! decisions, `[8:tx_id][1:decision][4:crc32]`. This is the source of truth
//! recovery consults when a partition's WAL shows a transaction's ops
//! written but no local commit/abort marker yet — i.e. a crash between
//! Phase 1 prepare and Phase 2 decision.

use crate::checksum;
use crate::error::{EngineError, Result};
use crate::types::TxId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Abort = 0,
    Commit = 1,
}

impl Decision {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Decision::Abort),
            1 => Some(Decision::Commit),
            _ => None,
        }
    }
}

const RECORD_LEN: usize = 8 + 1 + 4;

pub struct CoordinatorLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CoordinatorLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
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

    pub fn append(&self, tx_id: TxId, decision: Decision) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_LEN);
        buf.extend_from_slice(&tx_id.to_le_bytes());
        buf.push(decision as u8);
        let crc = checksum::compute(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        let mut file = self.file.lock();
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replays the log, validating each record's checksum. Stops at the
    /// first corrupted/truncated record and truncates the file there.
    pub fn recover(&self) -> Result<HashMap<TxId, Decision>> {
        let mut out = HashMap::new();
        let mut file = File::open(&self.path)?;
        let mut valid_bytes = 0u64;
        loop {
            let mut buf = [0u8; RECORD_LEN];
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let tx_id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
            let decision_byte = buf[8];
            let stored_crc = u32::from_le_bytes(buf[9..13].try_into().unwrap());

            let decision = match (Decision::from_byte(decision_byte), checksum::verify(&buf[0..9], stored_crc)) {
                (Some(d), Ok(())) => d,
                _ => {
                    eprintln!(
                        "[partitiondb] coordinator log: truncating {} at byte {valid_bytes} after corrupt record",
                        self.path.display()
                    );
                    let f = OpenOptions::new().write(true).open(&self.path)?;
                    f.set_len(valid_bytes)?;
                    break;
                }
            };
            valid_bytes += RECORD_LEN as u64;
            out.insert(tx_id, decision);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_recover() {
        let dir = tempdir().unwrap();
        let log = CoordinatorLog::open(dir.path().join("coordinator.log")).unwrap();
        log.append(1, Decision::Commit).unwrap();
        log.append(2, Decision::Abort).unwrap();

        let decisions = log.recover().unwrap();
        assert_eq!(decisions.get(&1), Some(&Decision::Commit));
        assert_eq!(decisions.get(&2), Some(&Decision::Abort));
    }

    #[test]
    fn corrupted_tail_is_truncated_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coordinator.log");
        {
            let log = CoordinatorLog::open(&path).unwrap();
            log.append(1, Decision::Commit).unwrap();
        }
        let mut raw = std::fs::read(&path).unwrap();
        *raw.last_mut().unwrap() ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let log = CoordinatorLog::open(&path).unwrap();
        let decisions = log.recover().unwrap();
        assert!(decisions.is_empty());
    }
}
