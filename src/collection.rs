//! Collection registry: the set of collection namespaces within a logical
//! DB, persisted as a bincode blob rewritten on every mutation. Documents
//! carry no schema, so the registry only needs to track names, not shapes.

use crate::error::{EngineError, Result};
use crate::types::{validate_name, DEFAULT_COLLECTION};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default)]
struct Persisted {
    names: HashSet<String>,
}

pub struct CollectionRegistry {
    persist_path: PathBuf,
    names: RwLock<HashSet<String>>,
}

impl CollectionRegistry {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let persist_path = dir.as_ref().join("collections.bin");
        let names = if persist_path.exists() {
            let data = fs::read(&persist_path)?;
            let persisted: Persisted = bincode::deserialize(&data)?;
            persisted.names
        } else {
            let mut names = HashSet::new();
            names.insert(DEFAULT_COLLECTION.to_string());
            names
        };
        let registry = Self {
            persist_path,
            names: RwLock::new(names),
        };
        registry.persist()?;
        Ok(registry)
    }

    fn persist(&self) -> Result<()> {
        let persisted = Persisted {
            names: self.names.read().clone(),
        };
        let bytes = bincode::serialize(&persisted)?;
        fs::write(&self.persist_path, bytes)?;
        Ok(())
    }

    pub fn create(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut names = self.names.write();
        if !names.insert(name.to_string()) {
            return Err(EngineError::AlreadyExists(format!("collection '{name}'")));
        }
        drop(names);
        self.persist()
    }

    /// Removes `name` from the registry. The caller is responsible for
    /// having already verified emptiness against the document index: this
    /// registry only tracks names, not document counts.
    pub fn delete(&self, name: &str) -> Result<()> {
        if name == DEFAULT_COLLECTION {
            return Err(EngineError::InvalidName(
                "the default collection cannot be deleted".into(),
            ));
        }
        let mut names = self.names.write();
        if !names.remove(name) {
            return Err(EngineError::NotFound(format!("collection '{name}'")));
        }
        drop(names);
        self.persist()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.read().contains(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut v: Vec<String> = self.names.read().iter().cloned().collect();
        v.sort();
        v
    }

    pub fn require_exists(&self, name: &str) -> Result<()> {
        if self.exists(name) {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("collection '{name}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_collection_exists_and_cannot_be_deleted() {
        let dir = tempdir().unwrap();
        let reg = CollectionRegistry::open(dir.path()).unwrap();
        assert!(reg.exists(DEFAULT_COLLECTION));
        assert!(reg.delete(DEFAULT_COLLECTION).is_err());
    }

    #[test]
    fn create_list_delete() {
        let dir = tempdir().unwrap();
        let reg = CollectionRegistry::open(dir.path()).unwrap();
        reg.create("orders").unwrap();
        assert!(reg.list().contains(&"orders".to_string()));
        reg.delete("orders").unwrap();
        assert!(!reg.exists("orders"));
    }

    #[test]
    fn duplicate_create_rejected() {
        let dir = tempdir().unwrap();
        let reg = CollectionRegistry::open(dir.path()).unwrap();
        reg.create("orders").unwrap();
        assert!(matches!(reg.create("orders"), Err(EngineError::AlreadyExists(_))));
    }
}
