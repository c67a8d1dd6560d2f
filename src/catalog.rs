//! Database catalog: the process-wide registry of logical databases,
//! persisted as `.catalog` under the data directory. Entry format,
//! little-endian, no checksum trailer (unlike the WAL/data-file/
//! coordinator-log formats — a corrupted catalog entry is rare enough, and
//! cheap enough to simply drop the tail on, that the extra 4 bytes per
//! entry weren't worth it):
//! `[8:db_id][2:name_len][1:status][N:name]`, `status` 1=Active, 2=Deleted.
//!
//! In-memory state is a `HashMap` behind an `RwLock`; every mutation
//! appends one record and keeps the map in sync, so a reader never needs
//! to touch disk.

use crate::error::{EngineError, Result};
use crate::types::validate_name;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStatus {
    Active = 1,
    Deleted = 2,
}

impl DbStatus {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(DbStatus::Active),
            2 => Some(DbStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    db_id: u64,
    status: DbStatus,
}

pub struct Catalog {
    path: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
    next_db_id: RwLock<u64>,
}

impl Catalog {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join(".catalog");
        std::fs::create_dir_all(data_dir.as_ref())?;
        let mut entries: HashMap<String, Entry> = HashMap::new();
        let mut max_id = 0u64;

        if path.exists() {
            let mut file = File::open(&path)?;
            let mut valid_bytes = 0u64;
            loop {
                let mut header = [0u8; 8 + 2 + 1];
                match file.read_exact(&mut header) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                }
                let db_id = u64::from_le_bytes(header[0..8].try_into().unwrap());
                let name_len = u16::from_le_bytes(header[8..10].try_into().unwrap()) as usize;
                let status_byte = header[10];

                let mut name_buf = vec![0u8; name_len];
                if file.read_exact(&mut name_buf).is_err() {
                    eprintln!("[partitiondb] catalog: truncating at byte {valid_bytes}, partial record");
                    let f = OpenOptions::new().write(true).open(&path)?;
                    f.set_len(valid_bytes)?;
                    break;
                }
                let (name, status) = match (String::from_utf8(name_buf), DbStatus::from_byte(status_byte)) {
                    (Ok(n), Some(s)) => (n, s),
                    _ => {
                        eprintln!("[partitiondb] catalog: truncating at byte {valid_bytes}, malformed record");
                        let f = OpenOptions::new().write(true).open(&path)?;
                        f.set_len(valid_bytes)?;
                        break;
                    }
                };
                valid_bytes += header.len() as u64 + name_len as u64;
                max_id = max_id.max(db_id);
                entries.insert(name, Entry { db_id, status });
            }
        }

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            next_db_id: RwLock::new(max_id + 1),
        })
    }

    fn append_entry(&self, db_id: u64, status: DbStatus, name: &str) -> Result<()> {
        let name_bytes = name.as_bytes();
        let mut buf = Vec::with_capacity(11 + name_bytes.len());
        buf.extend_from_slice(&db_id.to_le_bytes());
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.push(status as u8);
        buf.extend_from_slice(name_bytes);

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    pub fn create_db(&self, name: &str) -> Result<u64> {
        validate_name(name)?;
        let mut entries = self.entries.write();
        if let Some(e) = entries.get(name) {
            if e.status == DbStatus::Active {
                return Err(EngineError::AlreadyExists(format!("database '{name}'")));
            }
        }
        let mut next_id = self.next_db_id.write();
        let db_id = *next_id;
        *next_id += 1;
        self.append_entry(db_id, DbStatus::Active, name)?;
        entries.insert(
            name.to_string(),
            Entry {
                db_id,
                status: DbStatus::Active,
            },
        );
        Ok(db_id)
    }

    pub fn delete_db(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get(name)
            .filter(|e| e.status == DbStatus::Active)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("database '{name}'")))?;
        self.append_entry(entry.db_id, DbStatus::Deleted, name)?;
        entries.insert(
            name.to_string(),
            Entry {
                db_id: entry.db_id,
                status: DbStatus::Deleted,
            },
        );
        Ok(())
    }

    pub fn db_id(&self, name: &str) -> Result<u64> {
        self.entries
            .read()
            .get(name)
            .filter(|e| e.status == DbStatus::Active)
            .map(|e| e.db_id)
            .ok_or_else(|| EngineError::NotFound(format!("database '{name}'")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries
            .read()
            .get(name)
            .map(|e| e.status == DbStatus::Active)
            .unwrap_or(false)
    }

    pub fn list_active(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.status == DbStatus::Active)
            .map(|(n, _)| n.clone())
            .collect()
    }
}
