//! Quota outage on the primary record store, end to end through the catalog.

use draftsync_core::{Namespace, Operation};
use draftsync_metadata::{
    BlobStore, CourseCatalog, MemoryRecordStore, ObjectBlobStore, PointerCacheConfig,
    RecordStore, RegistryConfig, PUBLISHED_COURSES,
};
use object_store::memory::InMemory;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

struct Server {
    records: Arc<MemoryRecordStore>,
    blobs: Arc<ObjectBlobStore>,
    registry_config: RegistryConfig,
}

impl Server {
    fn new(dir: &TempDir) -> Self {
        Self {
            records: Arc::new(MemoryRecordStore::new()),
            blobs: Arc::new(ObjectBlobStore::new(
                Arc::new(InMemory::new()),
                "https://blobs.example.com",
            )),
            registry_config: RegistryConfig {
                file_path: dir.path().join("course-registry.json"),
                ..Default::default()
            },
        }
    }

    async fn catalog(&self) -> CourseCatalog {
        CourseCatalog::open(
            self.blobs.clone(),
            self.records.clone(),
            PointerCacheConfig::default(),
            &self.registry_config,
        )
        .await
        .unwrap()
    }
}

fn course(title: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({ "title": title, "sections": [] })).unwrap()
}

#[tokio::test]
async fn test_fallback_then_drain() {
    let dir = TempDir::new().unwrap();
    let server = Server::new(&dir);
    let catalog = server.catalog().await;

    server.records.set_quota_exhausted(true);
    let outcome = catalog
        .save_document("c1", Operation::Publish, &course("Intro"))
        .await
        .unwrap();
    assert!(outcome.fallback);
    assert_eq!(server.records.write_count(), 0);

    let pending = catalog.registry().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].document_id, "c1");
    assert_eq!(pending[0].remote_ref, outcome.remote_ref);

    // The blob itself was written, so the document is readable already
    let (pointer, bytes) = catalog
        .document("c1", Namespace::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.meta.title, "Intro");
    assert!(!bytes.is_empty());

    server.records.set_quota_exhausted(false);
    let invalidations_before = catalog
        .pointers()
        .metrics()
        .invalidations
        .load(Ordering::Relaxed);

    let report = catalog.sync_pending().await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(!report.quota_exhausted);
    assert!(catalog.registry().pending().await.is_empty());
    assert_eq!(
        catalog
            .pointers()
            .metrics()
            .invalidations
            .load(Ordering::Relaxed),
        invalidations_before + 1
    );

    let record = server
        .records
        .get(PUBLISHED_COURSES, "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["remoteRef"], outcome.remote_ref.as_str());

    // Synced entries stay in the registry as a local cache
    let kept = catalog
        .registry()
        .get("c1", Namespace::Published)
        .await
        .unwrap();
    assert!(!kept.pending_sync);
}

#[tokio::test]
async fn test_stale_pointers_served_during_outage() {
    let dir = TempDir::new().unwrap();
    let server = Server::new(&dir);
    let catalog = server.catalog().await;

    catalog
        .save_document("c1", Operation::Publish, &course("Intro"))
        .await
        .unwrap();
    let warm = catalog
        .pointers()
        .get_published_pointer("c1")
        .await
        .unwrap()
        .unwrap();

    server.records.set_quota_exhausted(true);
    catalog.pointers().reload().await.unwrap();

    let served = catalog
        .pointers()
        .get_published_pointer("c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(served, warm);
    assert!(
        catalog
            .pointers()
            .metrics()
            .stale_serves
            .load(Ordering::Relaxed)
            >= 1
    );
}

#[tokio::test]
async fn test_pending_entries_survive_restart() {
    let dir = TempDir::new().unwrap();
    let server = Server::new(&dir);

    {
        let catalog = server.catalog().await;
        server.records.set_quota_exhausted(true);
        catalog
            .save_document("c1", Operation::Checkpoint, &course("Draft"))
            .await
            .unwrap();
        catalog
            .save_document("c2", Operation::Publish, &course("Live"))
            .await
            .unwrap();
    }

    let catalog = server.catalog().await;
    let pending = catalog.registry().pending().await;
    assert_eq!(pending.len(), 2);

    let draft = catalog
        .pointer("c1", Some(Namespace::Draft))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(draft.remote_ref, server.blobs.url_for("drafts/c1.json"));

    server.records.set_quota_exhausted(false);
    assert_eq!(catalog.sync_pending().await.unwrap().synced, 2);
}
