//! Persisted key-value store for build-configuration selections.
//!
//! The argument resolvers record per-target selector choices through the
//! [`SelectionStore`] trait. [`JsonFileStore`] keeps the whole map in one
//! JSON file written atomically (temp file + rename), so a crash mid-write
//! never corrupts previous selections.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Key-value persistence consumed by the resolver layer.
///
/// Keys are target URIs (plus a resolver-chosen suffix); values are
/// arbitrary JSON. Writes for the same key must be atomic per key;
/// last-write-wins is acceptable.
pub trait SelectionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().expect("store lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.data
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store: one JSON object, rewritten atomically on every `set`.
///
/// The mutex serializes same-key races; distinct keys still go through the
/// same file, which is fine at selection-change frequency.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing content if present.
    /// A missing file is an empty store; a corrupt file is replaced on
    /// the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Selection store {} is corrupt: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    fn persist(&self, data: &HashMap<String, serde_json::Value>) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;

        let text = serde_json::to_string_pretty(data).context("serializing selection store")?;
        // Temp file in the same directory so the rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(parent).context("creating temp file")?;
        tmp.write_all(text.as_bytes()).context("writing temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("persisting {}", self.path.display()))?;
        Ok(())
    }
}

impl SelectionStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().expect("store lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut data = self.data.lock().expect("store lock poisoned");
        data.insert(key.to_string(), value);
        self.persist(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", serde_json::json!({"a": 1})).unwrap();
        assert_eq!(store.get("k"), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.json");

        let store = JsonFileStore::open(&path);
        store
            .set("bsp://workspace/app", serde_json::json!({"configuration": "Debug"}))
            .unwrap();

        // Reopen, as after a process restart.
        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get("bsp://workspace/app"),
            Some(serde_json::json!({"configuration": "Debug"}))
        );
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json"));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_recovers_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.json");
        std::fs::write(&path, "{{{ corrupt").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());
        store.set("k", serde_json::json!("v")).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("k"), Some(serde_json::json!("v")));
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("s.json"));
        store.set("k", serde_json::json!(1)).unwrap();
        store.set("k", serde_json::json!(2)).unwrap();
        assert_eq!(store.get("k"), Some(serde_json::json!(2)));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("s.json");
        let store = JsonFileStore::open(&path);
        store.set("k", serde_json::json!(true)).unwrap();
        assert!(path.exists());
    }
}
