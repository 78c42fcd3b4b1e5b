//! Per-account summary cache storage
//!
//! [`KeyValueStore`] is the raw, namespaced persistence capability; two
//! backends are provided ([`MemoryStore`] and [`FileStore`]). [`CacheStore`]
//! layers the summary entry format on top and turns every storage or decode
//! failure into a logged miss, so callers only ever see whole entries.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::cache_key::CacheKey;
use crate::errors::StoreError;

/// Persisted summary
///
/// Stored with its timestamp so an expiration policy can be added later
/// without migrating existing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Summary text exactly as returned to the caller
    pub summary_text: String,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

/// Namespaced key-value persistence
///
/// Every operation is scoped to one account namespace; two namespaces never
/// observe each other's keys even when the keys are equal.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when absent
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;
    /// Write or overwrite a value
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;
    /// Delete a value; returns whether something was removed
    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;
}

/// Process-local store
///
/// Used when no cache directory is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.namespaces.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.namespaces.lock().map_err(|_| StoreError::Poisoned)?;
        guard
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.namespaces.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .get_mut(namespace)
            .is_some_and(|ns| ns.remove(key).is_some()))
    }
}

/// Directory-backed store
///
/// Layout: `<root>/<sha256(namespace)>/<key>.json`. Writes go to a sibling
/// temp file and are renamed into place, so readers never see a partial
/// value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; directories are created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        let digest = Sha256::digest(namespace.as_bytes());
        self.root.join(format!("{digest:x}"))
    }

    fn entry_path(&self, namespace: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_file_key(key)?;
        Ok(self.namespace_dir(namespace).join(format!("{key}.json")))
    }
}

/// Keys become file names, so only a conservative alphabet is allowed
fn validate_file_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.len() > 128
        || !key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(StoreError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid cache key '{key}'"),
        )));
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.entry_path(namespace, key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.entry_path(namespace, key)?;
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir)?;
        // Unique temp file per write; concurrent writers each rename a whole file.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Summary cache over a [`KeyValueStore`]
///
/// Never fails: read problems become misses and write problems become
/// `false`, both logged.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Pick the backend from an optional cache directory
    pub fn from_dir(cache_dir: Option<&Path>) -> Self {
        match cache_dir {
            Some(dir) => Self::new(Arc::new(FileStore::new(dir))),
            None => Self::new(Arc::new(MemoryStore::new())),
        }
    }

    /// Read a cached summary
    ///
    /// Corrupt, unreadable, or empty entries are treated as absent.
    pub fn get(&self, namespace: &str, key: &CacheKey) -> Option<String> {
        let raw = match self.backend.get(namespace, key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.summary_text.is_empty() => {
                debug!(key = %key, stored_at = %entry.stored_at, "cache entry loaded");
                Some(entry.summary_text)
            }
            Ok(_) => {
                warn!(key = %key, "cache entry has empty summary; treating as miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache entry is corrupt; treating as miss");
                None
            }
        }
    }

    /// Write a summary; returns whether the write succeeded
    pub fn put(&self, namespace: &str, key: &CacheKey, summary_text: &str) -> bool {
        let entry = CacheEntry {
            summary_text: summary_text.to_owned(),
            stored_at: Utc::now(),
        };
        let result = serde_json::to_string(&entry)
            .map_err(StoreError::from)
            .and_then(|raw| self.backend.put(namespace, key.as_str(), &raw));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Remove a summary; returns whether an entry existed
    pub fn remove(&self, namespace: &str, key: &CacheKey) -> bool {
        match self.backend.delete(namespace, key.as_str()) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key = %key, error = %e, "cache delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CacheStore, FileStore, KeyValueStore, MemoryStore};
    use crate::cache_key::CacheKey;
    use crate::errors::StoreError;

    /// Backend whose writes always fail
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn put(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }

        fn delete(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }
    }

    fn key(message_id: &str) -> CacheKey {
        CacheKey::derive("user@example.com", message_id)
    }

    #[test]
    fn memory_round_trip_is_exact() {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        let text = "• línea uno\n• line two 😀\n";
        assert!(cache.put("user@example.com", &key("m1"), text));
        assert_eq!(cache.get("user@example.com", &key("m1")).as_deref(), Some(text));
    }

    #[test]
    fn namespaces_do_not_mix() {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        let shared = key("m1");
        assert!(cache.put("alice@example.com", &shared, "alice summary"));
        assert_eq!(cache.get("bob@example.com", &shared), None);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .put("user@example.com", key("m1").as_str(), "{not json")
            .expect("raw put succeeds");
        let cache = CacheStore::new(backend);
        assert_eq!(cache.get("user@example.com", &key("m1")), None);
    }

    #[test]
    fn entry_with_wrong_shape_is_a_miss() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .put("user@example.com", key("m1").as_str(), r#"{"summary":"x"}"#)
            .expect("raw put succeeds");
        let cache = CacheStore::new(backend);
        assert_eq!(cache.get("user@example.com", &key("m1")), None);
    }

    #[test]
    fn failed_write_reports_false() {
        let cache = CacheStore::new(Arc::new(ReadOnlyStore));
        assert!(!cache.put("user@example.com", &key("m1"), "text"));
        assert!(!cache.remove("user@example.com", &key("m1")));
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        assert!(cache.put("user@example.com", &key("m1"), "text"));
        assert!(cache.remove("user@example.com", &key("m1")));
        assert!(!cache.remove("user@example.com", &key("m1")));
        assert_eq!(cache.get("user@example.com", &key("m1")), None);
    }

    #[test]
    fn file_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CacheStore::new(Arc::new(FileStore::new(dir.path())));
        assert!(cache.put("user@example.com", &key("m1"), "summary text"));
        assert_eq!(
            cache.get("user@example.com", &key("m1")).as_deref(),
            Some("summary text")
        );
        assert_eq!(cache.get("other@example.com", &key("m1")), None);
        assert!(cache.remove("user@example.com", &key("m1")));
        assert_eq!(cache.get("user@example.com", &key("m1")), None);
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.put("ns", "abc", "value").expect("put succeeds");
        let ns_dir = std::fs::read_dir(dir.path())
            .expect("root readable")
            .next()
            .expect("namespace dir exists")
            .expect("dir entry")
            .path();
        let names: Vec<String> = std::fs::read_dir(ns_dir)
            .expect("namespace readable")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["abc.json".to_owned()]);
    }

    #[test]
    fn concurrent_file_writes_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CacheStore::new(Arc::new(FileStore::new(dir.path())));
        let values: Vec<String> = (0..4)
            .map(|i| char::from(b'a' + i).to_string().repeat(256 * 1024))
            .collect();

        for _ in 0..10 {
            let results: Vec<bool> = std::thread::scope(|scope| {
                let handles: Vec<_> = values
                    .iter()
                    .map(|value| {
                        let cache = cache.clone();
                        scope.spawn(move || cache.put("user@example.com", &key("m1"), value))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("writer thread"))
                    .collect()
            });
            assert!(results.iter().all(|ok| *ok));

            let stored = cache
                .get("user@example.com", &key("m1"))
                .expect("entry present after writes");
            assert!(values.contains(&stored));
        }
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert!(store.put("ns", "../escape", "value").is_err());
    }
}
