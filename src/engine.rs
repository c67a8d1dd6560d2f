//! Process-wide engine: owns the `Catalog` and every open `LogicalDB`,
//! giving callers a single entry point for creating, opening, and deleting
//! named databases without reaching into any one database's internals.

use crate::config::EngineConfig;
use crate::catalog::Catalog;
use crate::db::LogicalDB;
use crate::error::{EngineError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Engine {
    root: PathBuf,
    catalog: Catalog,
    config: EngineConfig,
    open_dbs: RwLock<HashMap<String, Arc<LogicalDB>>>,
}

impl Engine {
    pub fn open<P: AsRef<Path>>(root: P, config: EngineConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let catalog = Catalog::open(&root)?;

        let mut open_dbs = HashMap::new();
        for name in catalog.list_active() {
            let db_id = catalog.db_id(&name)?;
            let db = LogicalDB::open(&name, db_id, &root, &root, config.clone())?;
            open_dbs.insert(name, Arc::new(db));
        }

        Ok(Self {
            root,
            catalog,
            config,
            open_dbs: RwLock::new(open_dbs),
        })
    }

    pub fn create_db(&self, name: &str) -> Result<Arc<LogicalDB>> {
        let db_id = self.catalog.create_db(name)?;
        let db = Arc::new(LogicalDB::open(name, db_id, &self.root, &self.root, self.config.clone())?);
        self.open_dbs.write().insert(name.to_string(), db.clone());
        Ok(db)
    }

    pub fn get_db(&self, name: &str) -> Result<Arc<LogicalDB>> {
        self.open_dbs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("database '{name}'")))
    }

    /// Drops the in-process handle without touching on-disk state: a later
    /// `open_db`/engine restart will recover it exactly as a crash would,
    /// since `LogicalDB` never leaves committed state anywhere but in
    /// durable storage.
    pub fn close_db(&self, name: &str) -> Result<()> {
        self.open_dbs
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("database '{name}'")))
    }

    /// Reopens a previously closed (but not deleted) database from disk.
    pub fn open_db(&self, name: &str) -> Result<Arc<LogicalDB>> {
        if let Ok(db) = self.get_db(name) {
            return Ok(db);
        }
        let db_id = self.catalog.db_id(name)?;
        let db = Arc::new(LogicalDB::open(name, db_id, &self.root, &self.root, self.config.clone())?);
        self.open_dbs.write().insert(name.to_string(), db.clone());
        Ok(db)
    }

    pub fn delete_db(&self, name: &str) -> Result<()> {
        self.open_dbs.write().remove(name);
        self.catalog.delete_db(name)
    }

    pub fn list_dbs(&self) -> Vec<String> {
        self.catalog.list_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_list_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), EngineConfig::testing()).unwrap();
        engine.create_db("orders").unwrap();
        assert_eq!(engine.list_dbs(), vec!["orders".to_string()]);

        engine.delete_db("orders").unwrap();
        assert!(engine.list_dbs().is_empty());
        assert!(engine.get_db("orders").is_err());
    }

    #[test]
    fn close_then_reopen_recovers_state() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::testing()).unwrap();
            let db = engine.create_db("orders").unwrap();
            db.create("_default", 1, br#"{"a":1}"#.to_vec()).unwrap();
            engine.close_db("orders").unwrap();
            let reopened = engine.open_db("orders").unwrap();
            assert_eq!(reopened.read("_default", 1).unwrap(), br#"{"a":1}"#.to_vec());
        }

        let engine = Engine::open(dir.path(), EngineConfig::testing()).unwrap();
        let db = engine.get_db("orders").unwrap();
        assert_eq!(db.read("_default", 1).unwrap(), br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn create_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), EngineConfig::testing()).unwrap();
        engine.create_db("orders").unwrap();
        assert!(engine.create_db("orders").is_err());
    }
}
