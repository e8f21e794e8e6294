//! Remote Pointer Cache
//!
//! Process-wide cache of where each course's durable blob lives, split into the
//! `published` and `draft` namespaces. Every read of a course would otherwise hit
//! the primary record store, whose read quota is the scarce resource here.
//!
//! ## Snapshot Model
//!
//! ```text
//! get_*_pointer(id)
//!         ↓
//!   snapshot fresh (< TTL)? ──YES──→ serve from memory
//!         │
//!         NO
//!         ↓
//!   list published_courses + draft_courses
//!         ├─ Ok            → swap in new snapshot (both maps at once)
//!         ├─ quota error   → keep serving the previous snapshot (or an empty,
//!         │                  unloaded one if there never was one)
//!         └─ other error   → propagate
//! ```
//!
//! A reload never merges into the previous snapshot; readers see either the old
//! maps or the new ones.
//!
//! ## Invalidation
//!
//! - `invalidate()`: drop everything, the next read reloads
//! - `update_pointer()`: patch one entry in place after a successful write
//! - `remove_pointer()`: drop one course from both namespaces

use crate::config::PointerCacheConfig;
use crate::error::Result;
use crate::record::{RecordStore, DRAFT_COURSES, PUBLISHED_COURSES};
use draftsync_core::{now_ms, Namespace, PointerEntry};
use draftsync_observability::metrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Both pointer maps as loaded at `loaded_at`
#[derive(Debug, Clone, Default)]
pub struct PointerSnapshot {
    pub published: HashMap<String, PointerEntry>,
    pub draft: HashMap<String, PointerEntry>,
    pub loaded_at: i64,
}

impl PointerSnapshot {
    fn namespace(&self, namespace: Namespace) -> &HashMap<String, PointerEntry> {
        match namespace {
            Namespace::Published => &self.published,
            Namespace::Draft => &self.draft,
        }
    }

    fn namespace_mut(&mut self, namespace: Namespace) -> &mut HashMap<String, PointerEntry> {
        match namespace {
            Namespace::Published => &mut self.published,
            Namespace::Draft => &mut self.draft,
        }
    }
}

/// Cache performance metrics
#[derive(Debug, Clone, Default)]
pub struct PointerCacheMetrics {
    /// Lookups served from a fresh snapshot
    pub hits: Arc<AtomicU64>,
    /// Lookups that triggered a reload
    pub misses: Arc<AtomicU64>,
    pub reloads: Arc<AtomicU64>,
    /// Lookups answered from a stale snapshot after a quota failure
    pub stale_serves: Arc<AtomicU64>,
    pub invalidations: Arc<AtomicU64>,
}

impl PointerCacheMetrics {
    /// Hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

pub struct PointerCache {
    records: Arc<dyn RecordStore>,
    config: PointerCacheConfig,
    /// `None` until loaded, and again after `invalidate()`
    state: RwLock<Option<Arc<PointerSnapshot>>>,
    metrics: PointerCacheMetrics,
}

impl PointerCache {
    pub fn new(records: Arc<dyn RecordStore>, config: PointerCacheConfig) -> Self {
        Self {
            records,
            config,
            state: RwLock::new(None),
            metrics: PointerCacheMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &PointerCacheMetrics {
        &self.metrics
    }

    pub async fn get_published_pointer(&self, id: &str) -> Result<Option<PointerEntry>> {
        self.get_pointer(id, Namespace::Published).await
    }

    pub async fn get_draft_pointer(&self, id: &str) -> Result<Option<PointerEntry>> {
        self.get_pointer(id, Namespace::Draft).await
    }

    /// Draft pointer if there is one, otherwise the published one
    pub async fn get_any_pointer(&self, id: &str) -> Result<Option<PointerEntry>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .draft
            .get(id)
            .or_else(|| snapshot.published.get(id))
            .cloned())
    }

    pub async fn get_pointer(
        &self,
        id: &str,
        namespace: Namespace,
    ) -> Result<Option<PointerEntry>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.namespace(namespace).get(id).cloned())
    }

    /// True if a snapshot loaded from the record store is held (fresh or not)
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Drop both namespaces; the next lookup reloads
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Pointer cache invalidated");
    }

    /// Patch a single entry without reloading. No-op while nothing is loaded.
    pub async fn update_pointer(&self, id: &str, namespace: Namespace, entry: PointerEntry) {
        let mut state = self.state.write().await;
        if let Some(snapshot) = state.as_mut() {
            Arc::make_mut(snapshot)
                .namespace_mut(namespace)
                .insert(id.to_string(), entry);
        }
    }

    /// Forget one course in both namespaces
    pub async fn remove_pointer(&self, id: &str) {
        let mut state = self.state.write().await;
        if let Some(snapshot) = state.as_mut() {
            let snapshot = Arc::make_mut(snapshot);
            snapshot.published.remove(id);
            snapshot.draft.remove(id);
        }
    }

    /// Current snapshot, reloading it when absent or older than the TTL
    pub async fn snapshot(&self) -> Result<Arc<PointerSnapshot>> {
        if let Some(snapshot) = self.state.read().await.as_ref() {
            if now_ms() - snapshot.loaded_at < self.config.ttl_ms {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(snapshot));
            }
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        self.reload().await
    }

    /// Load both collections from the record store and swap them in.
    pub async fn reload(&self) -> Result<Arc<PointerSnapshot>> {
        match self.load_from_store().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.state.write().await = Some(Arc::clone(&snapshot));

                self.metrics.reloads.fetch_add(1, Ordering::Relaxed);
                metrics::POINTER_CACHE_RELOADS_TOTAL
                    .with_label_values(&["loaded"])
                    .inc();
                tracing::debug!(
                    published = snapshot.published.len(),
                    draft = snapshot.draft.len(),
                    "Pointer cache reloaded"
                );
                Ok(snapshot)
            }
            Err(e) if e.is_quota_exhausted() => {
                self.metrics.stale_serves.fetch_add(1, Ordering::Relaxed);
                metrics::POINTER_CACHE_RELOADS_TOTAL
                    .with_label_values(&["stale"])
                    .inc();

                let previous = self.state.read().await.clone();
                match previous {
                    Some(snapshot) => {
                        tracing::warn!(
                            error = %e,
                            age_ms = now_ms() - snapshot.loaded_at,
                            "Record store quota exhausted, serving stale pointers"
                        );
                        Ok(snapshot)
                    }
                    None => {
                        tracing::warn!(
                            error = %e,
                            "Record store quota exhausted and no pointers loaded yet"
                        );
                        Ok(Arc::new(PointerSnapshot::default()))
                    }
                }
            }
            Err(e) => {
                metrics::POINTER_CACHE_RELOADS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                tracing::error!(error = %e, "Pointer cache reload failed");
                Err(e)
            }
        }
    }

    async fn load_from_store(&self) -> Result<PointerSnapshot> {
        let published = self.load_collection(PUBLISHED_COURSES).await?;
        let draft = self.load_collection(DRAFT_COURSES).await?;
        Ok(PointerSnapshot {
            published,
            draft,
            loaded_at: now_ms(),
        })
    }

    async fn load_collection(&self, collection: &str) -> Result<HashMap<String, PointerEntry>> {
        let mut pointers = HashMap::new();
        for (id, value) in self.records.list(collection).await? {
            match serde_json::from_value::<PointerEntry>(value) {
                Ok(entry) => {
                    pointers.insert(id, entry);
                }
                Err(e) => {
                    tracing::warn!(
                        collection,
                        course_id = %id,
                        error = %e,
                        "Skipping malformed pointer"
                    );
                }
            }
        }
        Ok(pointers)
    }
}
