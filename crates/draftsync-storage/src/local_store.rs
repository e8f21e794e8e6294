//! Local Keyed Store
//!
//! Both client-side caches (drafts and the read cache) sit on the same small
//! abstraction: a named, persistent map from string keys to opaque bytes.
//!
//! ## Backends
//!
//! - [`FileStore`]: one directory per logical store, one file per key. Writes go to
//!   a temp file and are renamed into place, so a crash never leaves a torn entry.
//! - [`MemoryStore`]: in-process map used by tests and embedders. It can be switched
//!   into an unavailable state to exercise the `StorageUnavailable` path.
//!
//! ## On-Disk Layout
//!
//! ```text
//! <root>/<store name>/
//!     schema.json              {"store":"drafts","version":1}
//!     636f757273652d31.entry   value for key "course-1" (file name = hex(key))
//!     9f86d081….lentry         key longer than 100 bytes (file name = sha256(key))
//! ```
//!
//! A `.lentry` file starts with the key itself (u32 big-endian length, then the key
//! bytes) followed by the value, so `keys()` can still list it.
//!
//! ## Schema Upgrades
//!
//! Opening a store creates it if absent. A store written by an older (or the same)
//! schema version keeps all of its entries and has its marker bumped to the current
//! version. A marker from a newer version is refused with `SchemaVersion`.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Schema version written by this build
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_FILE: &str = "schema.json";
const ENTRY_SUFFIX: &str = ".entry";
const LONG_ENTRY_SUFFIX: &str = ".lentry";

/// Longest key stored under its hex-encoded name
const MAX_INLINE_KEY_BYTES: usize = 100;

/// Named persistent map from keys to bytes.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Logical store name (e.g. "drafts")
    fn name(&self) -> &str;

    /// Read the value for `key`, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Insert or overwrite the value for `key`
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All keys currently stored, in no particular order
    async fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaMarker {
    store: String,
    version: u32,
}

/// Directory-backed store.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    dir: PathBuf,
}

impl FileStore {
    /// Open (or create) the store `name` under `root` at the current schema version.
    pub async fn open<P: AsRef<Path>>(root: P, name: &str) -> Result<Self> {
        Self::open_with_version(root, name, SCHEMA_VERSION).await
    }

    /// Open (or create) the store `name` under `root` at `version`.
    pub async fn open_with_version<P: AsRef<Path>>(
        root: P,
        name: &str,
        version: u32,
    ) -> Result<Self> {
        let dir = root.as_ref().join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| unavailable(name, "create store directory", e))?;

        let marker_path = dir.join(SCHEMA_FILE);
        match tokio::fs::read(&marker_path).await {
            Ok(raw) => {
                let marker: SchemaMarker = serde_json::from_slice(&raw)?;
                if marker.version > version {
                    return Err(StorageError::SchemaVersion {
                        found: marker.version,
                        supported: version,
                    });
                }
                if marker.version < version {
                    tracing::info!(
                        store = name,
                        from = marker.version,
                        to = version,
                        "Upgrading local store schema, keeping existing entries"
                    );
                    write_marker(&marker_path, name, version).await?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(store = name, dir = %dir.display(), "Creating local store");
                write_marker(&marker_path, name, version).await?;
            }
            Err(e) => return Err(unavailable(name, "read schema marker", e)),
        }

        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Directory holding this store's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for `key` and whether it uses the long-key layout
    fn entry_stem(key: &str) -> (String, bool) {
        if key.len() > MAX_INLINE_KEY_BYTES {
            (hex::encode(Sha256::digest(key.as_bytes())), true)
        } else {
            (hex::encode(key.as_bytes()), false)
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let (stem, long) = Self::entry_stem(key);
        let suffix = if long { LONG_ENTRY_SUFFIX } else { ENTRY_SUFFIX };
        self.dir.join(format!("{}{}", stem, suffix))
    }
}

/// Split a `.lentry` file into its key and value
fn split_long_entry(raw: &[u8]) -> Option<(&str, &[u8])> {
    let len_bytes: [u8; 4] = raw.get(..4)?.try_into().ok()?;
    let key_len = u32::from_be_bytes(len_bytes) as usize;
    let key = std::str::from_utf8(raw.get(4..4 + key_len)?).ok()?;
    Some((key, &raw[4 + key_len..]))
}

async fn write_marker(path: &Path, store: &str, version: u32) -> Result<()> {
    let marker = SchemaMarker {
        store: store.to_string(),
        version,
    };
    let raw = serde_json::to_vec(&marker)?;
    tokio::fs::write(path, raw)
        .await
        .map_err(|e| unavailable(store, "write schema marker", e))
}

fn unavailable(store: &str, action: &str, e: std::io::Error) -> StorageError {
    StorageError::StorageUnavailable(format!("{}: failed to {}: {}", store, action, e))
}

#[async_trait]
impl LocalStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let data = match tokio::fs::read(self.entry_path(key)).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&self.name, "read entry", e)),
        };

        if key.len() <= MAX_INLINE_KEY_BYTES {
            return Ok(Some(data));
        }
        match split_long_entry(&data) {
            Some((stored, value)) if stored == key => {
                let offset = data.len() - value.len();
                Ok(Some(data.slice(offset..)))
            }
            _ => {
                tracing::warn!(store = %self.name, "Long-key entry header does not match key");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let path = self.entry_path(key);
        let (stem, long) = Self::entry_stem(key);
        let tmp = self.dir.join(format!(".{}.tmp", stem));

        let contents = if long {
            let mut framed = Vec::with_capacity(4 + key.len() + value.len());
            framed.extend_from_slice(&(key.len() as u32).to_be_bytes());
            framed.extend_from_slice(key.as_bytes());
            framed.extend_from_slice(&value);
            Bytes::from(framed)
        } else {
            value
        };

        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| unavailable(&self.name, "write entry", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable(&self.name, "commit entry", e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&self.name, "delete entry", e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| unavailable(&self.name, "list entries", e))?;

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| unavailable(&self.name, "list entries", e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if name.ends_with(LONG_ENTRY_SUFFIX) {
                let raw = tokio::fs::read(entry.path())
                    .await
                    .map_err(|e| unavailable(&self.name, "read entry", e))?;
                match split_long_entry(&raw) {
                    Some((key, _)) => keys.push(key.to_string()),
                    None => tracing::warn!(
                        store = %self.name,
                        file = %name,
                        "Skipping long-key entry with unreadable header"
                    ),
                }
                continue;
            }

            let Some(stem) = name.strip_suffix(ENTRY_SUFFIX) else {
                continue;
            };

            match hex::decode(stem).ok().and_then(|raw| String::from_utf8(raw).ok()) {
                Some(key) => keys.push(key),
                None => tracing::warn!(
                    store = %self.name,
                    file = %stem,
                    "Skipping entry with undecodable file name"
                ),
            }
        }

        Ok(keys)
    }
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<String, Bytes>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the persistence layer being blocked or disabled
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::StorageUnavailable(format!(
                "{}: store is disabled",
                self.name
            )))
        }
    }

    fn poisoned(&self) -> StorageError {
        StorageError::StorageUnavailable(format!("{}: lock poisoned", self.name))
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check()?;
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.check()?;
        self.entries
            .write()
            .map_err(|_| self.poisoned())?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries
            .write()
            .map_err(|_| self.poisoned())?
            .remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.check()?;
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_put_get_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path(), "drafts").await.unwrap();

        assert!(store.get("course/1").await.unwrap().is_none());

        store
            .put("course/1", Bytes::from_static(b"{\"v\":1}"))
            .await
            .unwrap();
        store
            .put("course/1", Bytes::from_static(b"{\"v\":2}"))
            .await
            .unwrap();

        let value = store.get("course/1").await.unwrap().unwrap();
        assert_eq!(&value[..], b"{\"v\":2}");
        assert_eq!(store.keys().await.unwrap(), vec!["course/1".to_string()]);

        store.delete("course/1").await.unwrap();
        store.delete("course/1").await.unwrap();
        assert!(store.get("course/1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_long_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path(), "read-cache").await.unwrap();
        let long_key = format!("blob/published/{}", "x".repeat(300));

        store
            .put(&long_key, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        store.put("short", Bytes::from_static(b"s")).await.unwrap();

        let value = store.get(&long_key).await.unwrap().unwrap();
        assert_eq!(&value[..], b"payload");

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![long_key.clone(), "short".to_string()]);

        store.delete(&long_key).await.unwrap();
        assert!(store.get(&long_key).await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap(), vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_reopen_keeps_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(temp_dir.path(), "read-cache").await.unwrap();
            store.put("a", Bytes::from_static(b"1")).await.unwrap();
        }

        let store = FileStore::open(temp_dir.path(), "read-cache").await.unwrap();
        assert_eq!(&store.get("a").await.unwrap().unwrap()[..], b"1");
    }

    #[tokio::test]
    async fn test_schema_upgrade_keeps_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let v1 = FileStore::open_with_version(temp_dir.path(), "drafts", 1)
                .await
                .unwrap();
            v1.put("course-1", Bytes::from_static(b"draft")).await.unwrap();
        }

        let v2 = FileStore::open_with_version(temp_dir.path(), "drafts", 2)
            .await
            .unwrap();
        assert_eq!(&v2.get("course-1").await.unwrap().unwrap()[..], b"draft");

        let marker = std::fs::read_to_string(v2.dir().join(SCHEMA_FILE)).unwrap();
        assert!(marker.contains("\"version\":2"));
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        FileStore::open_with_version(temp_dir.path(), "drafts", 3)
            .await
            .unwrap();

        let err = FileStore::open_with_version(temp_dir.path(), "drafts", 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::SchemaVersion {
                found: 3,
                supported: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_keys_ignore_foreign_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path(), "drafts").await.unwrap();
        store.put("x", Bytes::from_static(b"1")).await.unwrap();
        std::fs::write(store.dir().join("notes.txt"), b"hello").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryStore::new("drafts");
        store.put("a", Bytes::from_static(b"1")).await.unwrap();

        store.set_available(false);
        let err = store.get("a").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.put("b", Bytes::new()).await.is_err());

        store.set_available(true);
        assert_eq!(store.len(), 1);
    }
}
