//! Local Registry (fallback pointer store)
//!
//! When the primary record store rejects a pointer write for quota reasons, the
//! pointer is parked here with `pendingSync = true` until the sync queue manages to
//! write it to the primary store. Entries stay afterwards (`pendingSync = false`) as
//! a local cache.
//!
//! ## Layered Persistence
//!
//! The registry is persisted to one or more tiers, listed in precedence order:
//!
//! ```text
//! precedence 0  BlobTier  course-registry.json in the blob store  (Detached)
//! precedence 1  FileTier  local JSON file                          (Awaited)
//! ```
//!
//! - **Load** merges tiers: higher precedence wins, lower tiers only fill gaps. A
//!   tier that fails to load is logged and skipped.
//! - **Save** writes the full snapshot to every tier. `Awaited` tiers are written
//!   inline, in order, before `Detached` tiers are spawned. A save succeeds if any
//!   awaited tier succeeds; detached failures are only logged.
//!
//! ## Keys
//!
//! A course can have one pending pointer per namespace, so entries are keyed by
//! `(namespace, document id)`.

use crate::blob::BlobStore;
use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use draftsync_core::{now_ms, DocumentMeta, Namespace, RegistryEntry};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One persistence layer of the registry.
#[async_trait]
pub trait RegistryTier: Send + Sync {
    fn name(&self) -> &str;

    /// Every persisted entry; an absent snapshot is an empty list
    async fn load(&self) -> Result<Vec<RegistryEntry>>;

    /// Overwrite the persisted snapshot
    async fn save(&self, entries: &[RegistryEntry]) -> Result<()>;
}

/// How a tier participates in saves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierWrite {
    /// Written inline; the save waits for it
    Awaited,
    /// Spawned in the background; failures are logged and swallowed
    Detached,
}

/// Registry snapshot as a local JSON array file.
pub struct FileTier {
    path: PathBuf,
}

impl FileTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegistryTier for FileTier {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Vec<RegistryEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &[RegistryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Registry snapshot as a single blob, fully overwritten on every save.
pub struct BlobTier {
    blobs: Arc<dyn BlobStore>,
    name: String,
}

impl BlobTier {
    pub fn new(blobs: Arc<dyn BlobStore>, name: impl Into<String>) -> Self {
        Self {
            blobs,
            name: name.into(),
        }
    }
}

#[async_trait]
impl RegistryTier for BlobTier {
    fn name(&self) -> &str {
        "blob"
    }

    async fn load(&self) -> Result<Vec<RegistryEntry>> {
        match self.blobs.fetch(&self.blobs.url_for(&self.name)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(MetadataError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, entries: &[RegistryEntry]) -> Result<()> {
        let raw = serde_json::to_vec(entries)?;
        self.blobs.put(&self.name, Bytes::from(raw)).await?;
        Ok(())
    }
}

struct Tier {
    store: Arc<dyn RegistryTier>,
    write: TierWrite,
}

type RegistryKey = (Namespace, String);

/// In-memory union of all tiers plus write-through persistence.
pub struct LocalRegistry {
    tiers: Vec<Tier>,
    entries: RwLock<HashMap<RegistryKey, RegistryEntry>>,
    /// Serializes mutate-and-persist so snapshots reach the tiers in order
    write_lock: Mutex<()>,
}

impl LocalRegistry {
    /// Build a registry over `tiers` (highest precedence first) and load it.
    pub async fn open(tiers: Vec<(Arc<dyn RegistryTier>, TierWrite)>) -> Result<Self> {
        let registry = Self {
            tiers: tiers
                .into_iter()
                .map(|(store, write)| Tier { store, write })
                .collect(),
            entries: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Default layout: blob tier (detached) over a local file tier (awaited).
    pub async fn with_defaults(
        blobs: Arc<dyn BlobStore>,
        blob_name: &str,
        file_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::open(vec![
            (
                Arc::new(BlobTier::new(blobs, blob_name)) as Arc<dyn RegistryTier>,
                TierWrite::Detached,
            ),
            (
                Arc::new(FileTier::new(file_path)) as Arc<dyn RegistryTier>,
                TierWrite::Awaited,
            ),
        ])
        .await
    }

    /// Re-read and merge every tier. Returns the number of entries.
    pub async fn reload(&self) -> Result<usize> {
        let mut merged: HashMap<RegistryKey, RegistryEntry> = HashMap::new();

        for tier in &self.tiers {
            match tier.store.load().await {
                Ok(entries) => {
                    let loaded = entries.len();
                    for entry in entries {
                        merged
                            .entry((entry.namespace, entry.document_id.clone()))
                            .or_insert(entry);
                    }
                    tracing::debug!(tier = tier.store.name(), loaded, "Loaded registry tier");
                }
                Err(e) => {
                    tracing::warn!(
                        tier = tier.store.name(),
                        error = %e,
                        "Skipping unreadable registry tier"
                    );
                }
            }
        }

        let count = merged.len();
        *self.entries.write().await = merged;
        Ok(count)
    }

    /// Park a published pointer for later sync.
    pub async fn add_to_local_registry(
        &self,
        document_id: &str,
        remote_ref: &str,
        meta: DocumentMeta,
        sections: Option<Vec<Value>>,
    ) -> Result<RegistryEntry> {
        let entry = RegistryEntry {
            document_id: document_id.to_string(),
            remote_ref: remote_ref.to_string(),
            meta,
            sections,
            namespace: Namespace::Published,
            version: 0,
            hash: None,
            created_at: now_ms(),
            pending_sync: true,
        };
        self.add_entry(entry).await
    }

    /// Park a pointer for later sync. The entry is stored with `pendingSync = true`.
    pub async fn add_entry(&self, mut entry: RegistryEntry) -> Result<RegistryEntry> {
        entry.pending_sync = true;
        if entry.created_at == 0 {
            entry.created_at = now_ms();
        }

        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert((entry.namespace, entry.document_id.clone()), entry.clone());
            snapshot_of(&entries)
        };
        self.persist(snapshot).await?;

        tracing::info!(
            course_id = %entry.document_id,
            namespace = %entry.namespace,
            remote_ref = %entry.remote_ref,
            "Pointer parked in local registry"
        );
        Ok(entry)
    }

    pub async fn get(&self, document_id: &str, namespace: Namespace) -> Option<RegistryEntry> {
        self.entries
            .read()
            .await
            .get(&(namespace, document_id.to_string()))
            .cloned()
    }

    /// Every entry, oldest first
    pub async fn list(&self) -> Vec<RegistryEntry> {
        snapshot_of(&*self.entries.read().await)
    }

    /// Entries still waiting for the primary store, oldest first
    pub async fn pending(&self) -> Vec<RegistryEntry> {
        self.list()
            .await
            .into_iter()
            .filter(|e| e.pending_sync)
            .collect()
    }

    /// Record that the primary store accepted the entry. The entry is kept.
    ///
    /// Returns `false` if there is no such entry.
    pub async fn mark_as_synced(&self, document_id: &str, namespace: Namespace) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(&(namespace, document_id.to_string())) {
                Some(entry) => entry.pending_sync = false,
                None => return Ok(false),
            }
            snapshot_of(&entries)
        };
        self.persist(snapshot).await?;
        Ok(true)
    }

    /// Clear `pendingSync` only if the entry is still the one that was drained.
    ///
    /// A pointer parked again for the same course while the drain was writing the
    /// older one keeps its flag and goes out with the next drain.
    pub async fn mark_as_synced_if_unchanged(&self, drained: &RegistryEntry) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            let key = (drained.namespace, drained.document_id.clone());
            match entries.get_mut(&key) {
                Some(entry)
                    if entry.version == drained.version
                        && entry.remote_ref == drained.remote_ref
                        && entry.created_at == drained.created_at =>
                {
                    entry.pending_sync = false
                }
                Some(_) => {
                    tracing::debug!(
                        course_id = %drained.document_id,
                        namespace = %drained.namespace,
                        "Registry entry replaced during drain, leaving it pending"
                    );
                    return Ok(false);
                }
                None => return Ok(false),
            }
            snapshot_of(&entries)
        };
        self.persist(snapshot).await?;
        Ok(true)
    }

    /// Drop a course from both namespaces. Returns the number of entries removed.
    pub async fn remove(&self, document_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let (removed, snapshot) = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|(_, id), _| id != document_id);
            (before - entries.len(), snapshot_of(&entries))
        };
        if removed > 0 {
            self.persist(snapshot).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, snapshot: Vec<RegistryEntry>) -> Result<()> {
        let mut written = 0;
        let mut last_error = None;

        for tier in self.tiers.iter().filter(|t| t.write == TierWrite::Awaited) {
            match tier.store.save(&snapshot).await {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        tier = tier.store.name(),
                        error = %e,
                        "Registry tier write failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let snapshot = Arc::new(snapshot);
        for tier in self.tiers.iter().filter(|t| t.write == TierWrite::Detached) {
            let store = Arc::clone(&tier.store);
            let snapshot = Arc::clone(&snapshot);
            tokio::spawn(async move {
                if let Err(e) = store.save(&snapshot).await {
                    tracing::warn!(
                        tier = store.name(),
                        error = %e,
                        "Background registry tier write failed"
                    );
                }
            });
        }

        match last_error {
            Some(e) if written == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

fn snapshot_of(entries: &HashMap<RegistryKey, RegistryEntry>) -> Vec<RegistryEntry> {
    let mut list: Vec<_> = entries.values().cloned().collect();
    list.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::ObjectBlobStore;
    use object_store::memory::InMemory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct BrokenTier {
        saves: AtomicUsize,
    }

    #[async_trait]
    impl RegistryTier for BrokenTier {
        fn name(&self) -> &str {
            "broken"
        }

        async fn load(&self) -> Result<Vec<RegistryEntry>> {
            Err(MetadataError::Backend("unreachable".to_string()))
        }

        async fn save(&self, _entries: &[RegistryEntry]) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(MetadataError::Backend("unreachable".to_string()))
        }
    }

    fn entry(id: &str, namespace: Namespace, version: u64) -> RegistryEntry {
        RegistryEntry {
            document_id: id.to_string(),
            remote_ref: format!("memory://blobs/courses/{}/v{}.json", id, version),
            meta: DocumentMeta {
                title: format!("Course {}", id),
                ..Default::default()
            },
            sections: None,
            namespace,
            version,
            hash: None,
            created_at: 0,
            pending_sync: false,
        }
    }

    #[tokio::test]
    async fn test_add_and_mark_synced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        let registry = LocalRegistry::open(vec![(
            Arc::new(FileTier::new(&path)) as Arc<dyn RegistryTier>,
            TierWrite::Awaited,
        )])
        .await
        .unwrap();

        let added = registry
            .add_to_local_registry(
                "c1",
                "memory://blobs/courses/c1/v1.json",
                DocumentMeta::default(),
                None,
            )
            .await
            .unwrap();
        assert!(added.pending_sync);
        assert!(added.created_at > 0);
        assert_eq!(registry.pending().await.len(), 1);

        assert!(registry.mark_as_synced("c1", Namespace::Published).await.unwrap());
        assert!(!registry.mark_as_synced("c1", Namespace::Draft).await.unwrap());
        assert!(registry.pending().await.is_empty());

        // Synced entries are kept as a local cache
        let kept = registry.get("c1", Namespace::Published).await.unwrap();
        assert!(!kept.pending_sync);

        // Survives a reopen through the file tier
        let reopened = LocalRegistry::open(vec![(
            Arc::new(FileTier::new(&path)) as Arc<dyn RegistryTier>,
            TierWrite::Awaited,
        )])
        .await
        .unwrap();
        assert_eq!(reopened.list().await, vec![kept]);
    }

    #[tokio::test]
    async fn test_namespaces_do_not_clobber() {
        let dir = TempDir::new().unwrap();
        let registry = LocalRegistry::open(vec![(
            Arc::new(FileTier::new(dir.path().join("registry.json"))) as Arc<dyn RegistryTier>,
            TierWrite::Awaited,
        )])
        .await
        .unwrap();

        registry.add_entry(entry("c1", Namespace::Published, 2)).await.unwrap();
        registry.add_entry(entry("c1", Namespace::Draft, 3)).await.unwrap();
        registry.add_entry(entry("c2", Namespace::Draft, 1)).await.unwrap();

        assert_eq!(registry.list().await.len(), 3);
        assert_eq!(
            registry.get("c1", Namespace::Published).await.unwrap().version,
            2
        );

        assert_eq!(registry.remove("c1").await.unwrap(), 2);
        assert_eq!(registry.remove("c1").await.unwrap(), 0);
        let left = registry.list().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].document_id, "c2");
    }

    #[tokio::test]
    async fn test_precedence_merge() {
        let dir = TempDir::new().unwrap();
        let blobs: Arc<dyn BlobStore> =
            Arc::new(ObjectBlobStore::new(Arc::new(InMemory::new()), "memory://blobs"));
        let file = Arc::new(FileTier::new(dir.path().join("registry.json")));
        let blob = Arc::new(BlobTier::new(Arc::clone(&blobs), "course-registry.json"));

        let mut from_blob = entry("c1", Namespace::Published, 5);
        from_blob.created_at = 10;
        let mut from_file = entry("c1", Namespace::Published, 4);
        from_file.created_at = 20;
        let mut only_file = entry("c2", Namespace::Published, 1);
        only_file.created_at = 30;

        blob.save(&[from_blob.clone()]).await.unwrap();
        file.save(&[from_file, only_file.clone()]).await.unwrap();

        let registry = LocalRegistry::open(vec![
            (blob as Arc<dyn RegistryTier>, TierWrite::Detached),
            (file as Arc<dyn RegistryTier>, TierWrite::Awaited),
        ])
        .await
        .unwrap();

        assert_eq!(registry.list().await, vec![from_blob, only_file]);
    }

    #[tokio::test]
    async fn test_unreadable_tier_is_skipped() {
        let dir = TempDir::new().unwrap();
        let broken = Arc::new(BrokenTier {
            saves: AtomicUsize::new(0),
        });
        let registry = LocalRegistry::open(vec![
            (Arc::clone(&broken) as Arc<dyn RegistryTier>, TierWrite::Awaited),
            (
                Arc::new(FileTier::new(dir.path().join("registry.json"))) as Arc<dyn RegistryTier>,
                TierWrite::Awaited,
            ),
        ])
        .await
        .unwrap();

        // One awaited tier still succeeds, so the write is accepted
        registry.add_entry(entry("c1", Namespace::Draft, 1)).await.unwrap();
        assert_eq!(broken.saves.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_all_awaited_tiers_failing_is_an_error() {
        let registry = LocalRegistry::open(vec![(
            Arc::new(BrokenTier {
                saves: AtomicUsize::new(0),
            }) as Arc<dyn RegistryTier>,
            TierWrite::Awaited,
        )])
        .await
        .unwrap();

        assert!(registry
            .add_entry(entry("c1", Namespace::Draft, 1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mark_synced_skips_replaced_entry() {
        let dir = TempDir::new().unwrap();
        let registry = LocalRegistry::open(vec![(
            Arc::new(FileTier::new(dir.path().join("registry.json"))) as Arc<dyn RegistryTier>,
            TierWrite::Awaited,
        )])
        .await
        .unwrap();

        let drained = registry
            .add_entry(entry("c1", Namespace::Published, 1))
            .await
            .unwrap();
        registry
            .add_entry(entry("c1", Namespace::Published, 2))
            .await
            .unwrap();

        assert!(!registry.mark_as_synced_if_unchanged(&drained).await.unwrap());
        let current = registry.get("c1", Namespace::Published).await.unwrap();
        assert_eq!(current.version, 2);
        assert!(current.pending_sync);

        assert!(registry.mark_as_synced_if_unchanged(&current).await.unwrap());
        assert!(registry.pending().await.is_empty());
    }
}
