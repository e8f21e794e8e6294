//! Read Cache with LRU Eviction
//!
//! Keeps previously fetched course documents on the client so reopening a course does
//! not download it again. The cache is bounded by total blob size, not entry count.
//!
//! ## How It Works
//!
//! ```text
//! Editor opens course-42 (pointer says v7, hash abc…)
//!         ↓
//! is_cache_valid("course-42", 7, Some("abc…"))
//!         ↓
//!     VALID? ────YES──→ get_document() → inflate → parse (<1ms)
//!         │
//!         NO
//!         ↓
//! Fetch from server
//!         ↓
//! set_document() → compress → evict LRU until it fits → persist
//! ```
//!
//! ## Persistence Layout
//!
//! Each document is stored under two keys in the backing [`LocalStore`]:
//!
//! - `meta/<id>`: small JSON record (version, hash, sizeBytes, lastAccessed)
//! - `blob/<id>`: the compact document bytes
//!
//! Recency touches only rewrite the small record. On open the in-memory LRU order is
//! rebuilt from `lastAccessed`.
//!
//! ## Recency Touches
//!
//! `get()` promotes the entry in memory immediately and persists the new
//! `lastAccessed` from a detached task. The task takes the cache mutex, so it can
//! never interleave with an eviction; if the entry was evicted (or touched again)
//! in the meantime the stale touch is dropped. Touch failures are logged and swallowed.

use crate::error::Result;
use crate::local_store::LocalStore;
use bytes::Bytes;
use draftsync_core::{compress_text, decompress_payload, now_ms, CachedDocument, Codec};
use draftsync_observability::metrics;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

const META_PREFIX: &str = "meta/";
const BLOB_PREFIX: &str = "blob/";

/// Persisted per-document record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedRecord {
    document_id: String,
    version: u64,
    hash: String,
    is_compressed: bool,
    last_accessed: i64,
    size_bytes: u64,
}

struct CacheIndex {
    /// LRU tracker: document id → record, ordered by access
    lru: LruCache<String, CachedRecord>,
    current_size: u64,
    /// Last handed-out access timestamp; keeps `lastAccessed` strictly increasing
    clock: i64,
}

impl CacheIndex {
    fn tick(&mut self) -> i64 {
        self.clock = now_ms().max(self.clock + 1);
        self.clock
    }
}

/// Size-capped LRU cache of fetched documents.
pub struct ReadCache {
    store: Arc<dyn LocalStore>,
    codec: Arc<dyn Codec>,
    max_size_bytes: u64,
    index: Arc<Mutex<CacheIndex>>,
}

impl ReadCache {
    /// Open the cache over `store`, rebuilding the LRU order from persisted records.
    ///
    /// If the persisted entries exceed `max_size_bytes` (e.g. the cap was lowered),
    /// the least recently accessed ones are evicted right away.
    pub async fn open(
        store: Arc<dyn LocalStore>,
        codec: Arc<dyn Codec>,
        max_size_bytes: u64,
    ) -> Result<Self> {
        let mut records = Vec::new();
        let mut blobs = Vec::new();

        for key in store.keys().await? {
            if key.starts_with(META_PREFIX) {
                let Some(raw) = store.get(&key).await? else {
                    continue;
                };
                match serde_json::from_slice::<CachedRecord>(&raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Dropping unreadable cache record");
                        store.delete(&key).await?;
                    }
                }
            } else if let Some(id) = key.strip_prefix(BLOB_PREFIX) {
                blobs.push(id.to_string());
            }
        }

        // Oldest first, so the most recently accessed entry ends up at the front
        records.sort_by_key(|r| r.last_accessed);

        let mut index = CacheIndex {
            lru: LruCache::unbounded(),
            current_size: 0,
            clock: 0,
        };
        for record in records {
            index.current_size += record.size_bytes;
            index.clock = index.clock.max(record.last_accessed);
            index.lru.put(record.document_id.clone(), record);
        }

        for id in blobs {
            if !index.lru.contains(&id) {
                tracing::debug!(course_id = %id, "Removing orphaned cache blob");
                store.delete(&blob_key(&id)).await?;
            }
        }

        let cache = Self {
            store,
            codec,
            max_size_bytes,
            index: Arc::new(Mutex::new(index)),
        };

        {
            let mut index = cache.index.lock().await;
            cache.enforce_size_limit(&mut index, 0).await?;
            metrics::READ_CACHE_SIZE_BYTES.set(index.current_size as i64);
            tracing::info!(
                entries = index.lru.len(),
                size = index.current_size,
                max_size = max_size_bytes,
                "Opened read cache"
            );
        }

        Ok(cache)
    }

    /// Get a cached document.
    ///
    /// Returns `Some` on a hit and promotes it to most recently used.
    pub async fn get(&self, document_id: &str) -> Result<Option<CachedDocument>> {
        let (record, blob) = {
            let mut index = self.index.lock().await;
            let touched_at = index.tick();

            let Some(record) = index.lru.get_mut(document_id) else {
                metrics::READ_CACHE_MISSES_TOTAL.inc();
                return Ok(None);
            };
            record.last_accessed = touched_at;
            let record = record.clone();

            match self.store.get(&blob_key(document_id)).await? {
                Some(blob) => (record, blob),
                None => {
                    // Record without a blob is useless, forget it
                    tracing::warn!(course_id = %document_id, "Cached blob missing, dropping entry");
                    if let Some(stale) = index.lru.pop(document_id) {
                        index.current_size = index.current_size.saturating_sub(stale.size_bytes);
                        metrics::READ_CACHE_SIZE_BYTES.set(index.current_size as i64);
                    }
                    self.store.delete(&meta_key(document_id)).await?;
                    metrics::READ_CACHE_MISSES_TOTAL.inc();
                    return Ok(None);
                }
            }
        };

        metrics::READ_CACHE_HITS_TOTAL.inc();
        tracing::debug!(course_id = %document_id, size = blob.len(), "Cache hit");

        self.spawn_touch(record.clone());

        Ok(Some(CachedDocument {
            document_id: record.document_id,
            version: record.version,
            hash: record.hash,
            blob,
            is_compressed: record.is_compressed,
            last_accessed: record.last_accessed,
            size_bytes: record.size_bytes,
        }))
    }

    /// Insert or replace a cached document.
    ///
    /// Evicts least recently used entries until the new one fits. Returns `false`
    /// (and caches nothing) if the blob alone is larger than the whole cache.
    pub async fn set(
        &self,
        document_id: &str,
        version: u64,
        hash: &str,
        blob: Bytes,
        is_compressed: bool,
    ) -> Result<bool> {
        let size = blob.len() as u64;
        let mut index = self.index.lock().await;

        // The previous version is superseded either way
        self.release(&mut index, document_id).await?;

        if size > self.max_size_bytes {
            tracing::warn!(
                course_id = %document_id,
                size,
                max_size = self.max_size_bytes,
                "Cannot cache: document larger than max cache size"
            );
            metrics::READ_CACHE_SIZE_BYTES.set(index.current_size as i64);
            return Ok(false);
        }

        self.enforce_size_limit(&mut index, size).await?;

        let record = CachedRecord {
            document_id: document_id.to_string(),
            version,
            hash: hash.to_string(),
            is_compressed,
            last_accessed: index.tick(),
            size_bytes: size,
        };

        self.store.put(&blob_key(document_id), blob).await?;
        self.store
            .put(&meta_key(document_id), Bytes::from(serde_json::to_vec(&record)?))
            .await?;

        index.current_size += size;
        index.lru.put(document_id.to_string(), record);
        metrics::READ_CACHE_SIZE_BYTES.set(index.current_size as i64);

        tracing::debug!(course_id = %document_id, version, size, "Cached document");

        Ok(true)
    }

    /// Serialize, compress with the injected codec and cache a document.
    pub async fn set_document(
        &self,
        document_id: &str,
        version: u64,
        hash: &str,
        document: &Value,
    ) -> Result<bool> {
        let text = serde_json::to_string(document)?;
        let compressed = compress_text(self.codec.as_ref(), &text);
        self.set(
            document_id,
            version,
            hash,
            compressed.bytes,
            compressed.is_compressed,
        )
        .await
    }

    /// Cached document decoded back into JSON.
    ///
    /// A blob that no longer decodes is removed and reported as a miss.
    pub async fn get_document(&self, document_id: &str) -> Result<Option<Value>> {
        let Some(cached) = self.get(document_id).await? else {
            return Ok(None);
        };

        let decoded = decompress_payload(&cached.blob, cached.is_compressed)
            .map_err(crate::error::StorageError::from)
            .and_then(|raw| serde_json::from_slice::<Value>(&raw).map_err(Into::into));

        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    course_id = %document_id,
                    error = %e,
                    "Dropping undecodable cache entry"
                );
                self.remove(document_id).await?;
                Ok(None)
            }
        }
    }

    /// True only if an entry exists with `expected_version` (and `expected_hash`,
    /// when given). Does not affect recency.
    pub async fn is_cache_valid(
        &self,
        document_id: &str,
        expected_version: u64,
        expected_hash: Option<&str>,
    ) -> bool {
        let index = self.index.lock().await;
        match index.lru.peek(document_id) {
            Some(record) => {
                record.version == expected_version
                    && expected_hash.map_or(true, |hash| record.hash == hash)
            }
            None => false,
        }
    }

    /// Serve from cache when it matches `version`/`hash`, otherwise run `fetch` and
    /// cache its result.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        document_id: &str,
        version: u64,
        hash: &str,
        fetch: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: From<crate::error::StorageError>,
    {
        if self.is_cache_valid(document_id, version, Some(hash)).await {
            if let Some(value) = self.get_document(document_id).await? {
                return Ok(value);
            }
        }

        let value = fetch().await?;
        self.set_document(document_id, version, hash, &value).await?;
        Ok(value)
    }

    /// Drop one entry
    pub async fn remove(&self, document_id: &str) -> Result<()> {
        let mut index = self.index.lock().await;
        self.release(&mut index, document_id).await?;
        metrics::READ_CACHE_SIZE_BYTES.set(index.current_size as i64);
        Ok(())
    }

    /// Drop every entry
    pub async fn clear(&self) -> Result<()> {
        let mut index = self.index.lock().await;
        while let Some((document_id, _)) = index.lru.pop_lru() {
            self.delete_keys(&document_id).await?;
        }
        index.current_size = 0;
        metrics::READ_CACHE_SIZE_BYTES.set(0);
        tracing::info!("Cleared read cache");
        Ok(())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        CacheStats {
            current_size: index.current_size,
            max_size: self.max_size_bytes,
            entry_count: index.lru.len(),
            utilization_pct: if self.max_size_bytes == 0 {
                0.0
            } else {
                index.current_size as f64 / self.max_size_bytes as f64 * 100.0
            },
        }
    }

    /// Evict LRU entries until `incoming` more bytes fit under the cap
    async fn enforce_size_limit(&self, index: &mut CacheIndex, incoming: u64) -> Result<()> {
        while index.current_size + incoming > self.max_size_bytes {
            let Some((document_id, record)) = index.lru.pop_lru() else {
                break;
            };

            self.delete_keys(&document_id).await?;
            index.current_size = index.current_size.saturating_sub(record.size_bytes);

            metrics::READ_CACHE_EVICTIONS_TOTAL.inc();
            tracing::info!(
                course_id = %document_id,
                size = record.size_bytes,
                last_accessed = record.last_accessed,
                "Evicted from read cache"
            );
        }
        Ok(())
    }

    async fn release(&self, index: &mut CacheIndex, document_id: &str) -> Result<()> {
        if let Some(existing) = index.lru.pop(document_id) {
            index.current_size = index.current_size.saturating_sub(existing.size_bytes);
            self.delete_keys(document_id).await?;
        }
        Ok(())
    }

    async fn delete_keys(&self, document_id: &str) -> Result<()> {
        self.store.delete(&meta_key(document_id)).await?;
        self.store.delete(&blob_key(document_id)).await
    }

    fn spawn_touch(&self, record: CachedRecord) {
        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let index = index.lock().await;
            let current = index.lru.peek(&record.document_id);
            if current.map(|r| r.last_accessed) != Some(record.last_accessed) {
                // Evicted, replaced or touched again since
                return;
            }

            let raw = match serde_json::to_vec(&record) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        course_id = %record.document_id,
                        error = %e,
                        "Failed to encode cache touch"
                    );
                    return;
                }
            };
            if let Err(e) = store.put(&meta_key(&record.document_id), Bytes::from(raw)).await {
                tracing::warn!(
                    course_id = %record.document_id,
                    error = %e,
                    "Failed to persist cache touch"
                );
            }
        });
    }
}

fn meta_key(document_id: &str) -> String {
    format!("{}{}", META_PREFIX, document_id)
}

fn blob_key(document_id: &str) -> String {
    format!("{}{}", BLOB_PREFIX, document_id)
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current total size of cached blobs
    pub current_size: u64,

    /// Maximum allowed cache size
    pub max_size: u64,

    /// Number of cached documents
    pub entry_count: usize,

    /// Cache utilization percentage (0-100)
    pub utilization_pct: f64,
}
