//! Persistence port for the small amount of local state the client keeps.
//!
//! Credentials and the active session id are both stored as keyed string
//! records. Production code uses [`FileStore`], which keeps every record in
//! one JSON object under the user's config directory; tests and throwaway
//! runs use [`MemoryStore`].

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Keyed string storage shared by [`CredentialStore`](crate::CredentialStore)
/// and [`SessionIdentity`](crate::SessionIdentity).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a key that is not present is not an error.
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        records.remove(key);
        Ok(())
    }
}

/// JSON-file backed store. Every mutation is a read-modify-write of the whole
/// file, serialized through an in-process lock.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `~/.config/legalmate/state.json` (or the platform equivalent).
    pub fn open_default() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(Self::new(config_dir.join("legalmate").join("state.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Failed to parse {:?}", self.path))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!("State file {:?} is not a JSON object", self.path)),
        }
    }

    fn write_records(&self, records: &Map<String, Value>) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("file store lock poisoned"))?;
        let records = self.read_records()?;

        Ok(records.get(key).and_then(|v| v.as_str()).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("file store lock poisoned"))?;
        let mut records = self.read_records()?;
        records.insert(key.to_string(), Value::String(value.to_string()));
        self.write_records(&records)
    }

    fn clear(&self, key: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("file store lock poisoned"))?;
        let mut records = self.read_records()?;
        if records.remove(key).is_some() {
            self.write_records(&records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_set_get_clear() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.clear("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("state.json"));

        assert_eq!(store.get("anything").unwrap(), None);
        // Clearing an absent key must not create the file
        store.clear("anything").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legalmate").join("state.json");

        let first = FileStore::new(&path);
        first.set("session", "abc").unwrap();
        first.set("other", "xyz").unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.get("session").unwrap().as_deref(), Some("abc"));

        second.clear("session").unwrap();
        assert_eq!(first.get("session").unwrap(), None);
        assert_eq!(first.get("other").unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn file_store_rejects_non_object_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("k").is_err());
    }
}
