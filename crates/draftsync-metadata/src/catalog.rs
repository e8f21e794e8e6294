//! Course Catalog
//!
//! Server-side context shared by every request handler. It owns the blob store,
//! the primary record store, the pointer cache, the fallback registry and the
//! sync queue, and is constructed once at startup and shared by `Arc`.
//!
//! ## Save Flow
//!
//! ```text
//! save_document(id, op, bytes)
//!   1. parse JSON                     (InvalidDocument on failure)
//!   2. version = previous version + 1
//!        previous = newest of pointer cache, registry and (publish) stored vN blobs
//!   3. publish → invalidate pointer cache
//!   4. blob:  checkpoint → drafts/<id>.json
//!             publish    → courses/<id>/v<version>.json
//!   5. pointer record → primary store
//!        Ok          → pointer cache patched in place (reloaded after a publish)
//!        quota error → local registry (pendingSync = true), fallback = true
//! ```
//!
//! Reads merge the pointer cache with the registry so a pointer parked during a
//! quota outage is visible before the sync queue has drained it.
//!
//! Publishes are serialized and never reuse a version number that already has a
//! blob, so an existing `courses/<id>/v<n>.json` is never overwritten even when the
//! pointer cache is empty and the record store is refusing reads.

use crate::blob::BlobStore;
use crate::config::{PointerCacheConfig, RegistryConfig};
use crate::error::{MetadataError, Result};
use crate::pointer_cache::PointerCache;
use crate::record::{collection_for, RecordStore};
use crate::registry::LocalRegistry;
use crate::sync_queue::{SyncQueue, SyncQueueReport};
use bytes::Bytes;
use draftsync_core::{
    content_hash, document_sections, now_ms, DocumentMeta, Namespace, Operation, PointerEntry,
    RegistryEntry,
};
use draftsync_observability::metrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one server-side save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub course_id: String,
    pub operation: Operation,
    pub remote_ref: String,
    pub version: u64,
    pub hash: String,
    /// The pointer went to the local registry instead of the primary store
    pub fallback: bool,
}

/// What `delete_course` removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Published version blobs removed (the draft blob is not counted)
    pub blobs_deleted: usize,
    pub registry_entries_removed: usize,
}

pub struct CourseCatalog {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    pointers: Arc<PointerCache>,
    registry: Arc<LocalRegistry>,
    sync_queue: Arc<SyncQueue>,
    /// Version allocation for publishes
    publish_lock: Mutex<()>,
}

impl CourseCatalog {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        registry: Arc<LocalRegistry>,
        pointer_config: PointerCacheConfig,
    ) -> Self {
        let pointers = Arc::new(PointerCache::new(Arc::clone(&records), pointer_config));
        let sync_queue = Arc::new(SyncQueue::new(
            Arc::clone(&registry),
            Arc::clone(&records),
            Arc::clone(&pointers),
        ));

        Self {
            blobs,
            records,
            pointers,
            registry,
            sync_queue,
            publish_lock: Mutex::new(()),
        }
    }

    /// Build a catalog with the default registry layout (blob tier over file tier).
    pub async fn open(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        pointer_config: PointerCacheConfig,
        registry_config: &RegistryConfig,
    ) -> Result<Self> {
        let registry = LocalRegistry::with_defaults(
            Arc::clone(&blobs),
            &registry_config.blob_name,
            registry_config.file_path.clone(),
        )
        .await?;

        info!(
            registry_file = %registry_config.file_path.display(),
            registry_entries = registry.list().await.len(),
            "Course catalog opened"
        );
        Ok(Self::new(blobs, records, Arc::new(registry), pointer_config))
    }

    pub fn pointers(&self) -> &Arc<PointerCache> {
        &self.pointers
    }

    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.registry
    }

    pub fn sync_queue(&self) -> &Arc<SyncQueue> {
        &self.sync_queue
    }

    /// Persist an uploaded course document and record where it lives.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn save_document(
        &self,
        course_id: &str,
        operation: Operation,
        bytes: &[u8],
    ) -> Result<SaveOutcome> {
        if course_id.is_empty() || course_id.contains('/') {
            return Err(MetadataError::InvalidDocument(format!(
                "invalid course id: {:?}",
                course_id
            )));
        }

        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| MetadataError::InvalidDocument(e.to_string()))?;

        let namespace = operation.namespace();
        let _publishing = match operation {
            Operation::Publish => Some(self.publish_lock.lock().await),
            Operation::Checkpoint => None,
        };

        let mut previous = self
            .pointer(course_id, Some(namespace))
            .await?
            .map(|p| p.version)
            .unwrap_or(0);
        if operation == Operation::Publish {
            previous = previous.max(self.latest_published_version(course_id).await?);
        }
        let version = previous + 1;

        if operation == Operation::Publish {
            self.pointers.invalidate().await;
        }

        let canonical = serde_json::to_vec(&document)?;
        let hash = content_hash(&canonical);
        let blob_name = match operation {
            Operation::Checkpoint => format!("drafts/{}.json", course_id),
            Operation::Publish => format!("courses/{}/v{}.json", course_id, version),
        };
        let remote_ref = self.blobs.put(&blob_name, Bytes::from(canonical)).await?;

        let pointer = PointerEntry {
            remote_ref: remote_ref.clone(),
            version,
            hash: Some(hash.clone()),
            meta: DocumentMeta::from_document(&document),
            sections: document_sections(&document),
            updated_at: now_ms(),
        };

        let fallback = match self
            .records
            .set(
                collection_for(namespace),
                course_id,
                serde_json::to_value(&pointer)?,
                true,
            )
            .await
        {
            Ok(()) => {
                if operation == Operation::Publish {
                    // Invalidated above; load the fresh record set back in
                    if let Err(e) = self.pointers.reload().await {
                        warn!(course_id, error = %e, "Pointer cache reload after publish failed");
                    }
                }
                self.pointers
                    .update_pointer(course_id, namespace, pointer)
                    .await;
                false
            }
            Err(e) if e.is_quota_exhausted() => {
                warn!(
                    course_id,
                    namespace = %namespace,
                    error = %e,
                    "Record store over quota, parking pointer in local registry"
                );
                self.registry
                    .add_entry(RegistryEntry {
                        document_id: course_id.to_string(),
                        remote_ref: pointer.remote_ref,
                        meta: pointer.meta,
                        sections: pointer.sections,
                        namespace,
                        version,
                        hash: pointer.hash,
                        created_at: pointer.updated_at,
                        pending_sync: true,
                    })
                    .await?;
                metrics::REGISTRY_FALLBACK_WRITES_TOTAL.inc();
                true
            }
            Err(e) => return Err(e),
        };

        info!(
            course_id,
            operation = %operation,
            version,
            fallback,
            "Course document saved"
        );

        Ok(SaveOutcome {
            course_id: course_id.to_string(),
            operation,
            remote_ref,
            version,
            hash,
            fallback,
        })
    }

    /// Current pointer for a course.
    ///
    /// With no namespace the draft pointer is preferred over the published one.
    pub async fn pointer(
        &self,
        course_id: &str,
        namespace: Option<Namespace>,
    ) -> Result<Option<PointerEntry>> {
        match namespace {
            Some(namespace) => self.merged_pointer(course_id, namespace).await,
            None => match self.merged_pointer(course_id, Namespace::Draft).await? {
                Some(pointer) => Ok(Some(pointer)),
                None => self.merged_pointer(course_id, Namespace::Published).await,
            },
        }
    }

    async fn merged_pointer(
        &self,
        course_id: &str,
        namespace: Namespace,
    ) -> Result<Option<PointerEntry>> {
        let cached = self.pointers.get_pointer(course_id, namespace).await?;
        let parked = self
            .registry
            .get(course_id, namespace)
            .await
            .map(|entry| entry.to_pointer());

        Ok(match (cached, parked) {
            (Some(cached), Some(parked)) if parked.version > cached.version => Some(parked),
            (Some(cached), _) => Some(cached),
            (None, parked) => parked,
        })
    }

    /// Highest `v<n>` among the stored published blobs of a course
    async fn latest_published_version(&self, course_id: &str) -> Result<u64> {
        let marker = format!("/courses/{}/v", course_id);
        Ok(self
            .blobs
            .list(&format!("courses/{}", course_id))
            .await?
            .iter()
            .filter_map(|blob| {
                let (_, name) = blob.url.rsplit_once(&marker)?;
                name.strip_suffix(".json")?.parse::<u64>().ok()
            })
            .max()
            .unwrap_or(0))
    }

    /// Pointer plus the stored document bytes, if the course exists.
    pub async fn document(
        &self,
        course_id: &str,
        namespace: Namespace,
    ) -> Result<Option<(PointerEntry, Bytes)>> {
        let Some(pointer) = self.pointer(course_id, Some(namespace)).await? else {
            return Ok(None);
        };

        let bytes = self.blobs.fetch(&pointer.remote_ref).await?;
        debug!(course_id, version = pointer.version, size = bytes.len(), "Fetched course document");
        Ok(Some((pointer, bytes)))
    }

    /// Remove every trace of a course: blobs, pointer records and registry entries.
    pub async fn delete_course(&self, course_id: &str) -> Result<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();

        let mut urls: Vec<String> = self
            .blobs
            .list(&format!("courses/{}", course_id))
            .await?
            .into_iter()
            .map(|blob| blob.url)
            .collect();
        urls.push(self.blobs.url_for(&format!("drafts/{}.json", course_id)));

        for url in &urls {
            self.blobs.delete(url).await?;
        }
        outcome.blobs_deleted = urls.len() - 1;

        for namespace in [Namespace::Published, Namespace::Draft] {
            match self.records.delete(collection_for(namespace), course_id).await {
                Ok(()) => {}
                Err(e) if e.is_quota_exhausted() => {
                    warn!(
                        course_id,
                        namespace = %namespace,
                        error = %e,
                        "Record store over quota, pointer record left behind"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        outcome.registry_entries_removed = self.registry.remove(course_id).await?;
        self.pointers.invalidate().await;

        info!(
            course_id,
            blobs_deleted = outcome.blobs_deleted,
            registry_entries_removed = outcome.registry_entries_removed,
            "Course deleted"
        );
        Ok(outcome)
    }

    /// Drain pending registry entries into the primary store now.
    pub async fn sync_pending(&self) -> Result<SyncQueueReport> {
        self.sync_queue.sync_pending_courses().await
    }
}
