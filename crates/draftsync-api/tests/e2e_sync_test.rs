//! The real client against the real server over HTTP: checkpoint, chunked
//! publish and the cached read path.

use std::sync::Arc;
use std::time::Duration;

use draftsync_api::{create_router, AppState, UploadSessions};
use draftsync_client::{DraftSyncClient, ReadOrigin, SyncConfig, SyncSummary};
use draftsync_core::Namespace;
use draftsync_metadata::{
    CourseCatalog, MemoryRecordStore, ObjectBlobStore, PointerCacheConfig, RegistryConfig,
};
use draftsync_storage::StorageConfig;
use serde_json::{json, Value};

struct Harness {
    client: DraftSyncClient,
    catalog: Arc<CourseCatalog>,
    _server_dir: tempfile::TempDir,
    _client_dir: tempfile::TempDir,
}

async fn harness(max_chunk_size: usize) -> Harness {
    let server_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(
        CourseCatalog::open(
            Arc::new(ObjectBlobStore::new(
                Arc::new(object_store::memory::InMemory::new()),
                "memory://blobs",
            )),
            Arc::new(MemoryRecordStore::new()),
            PointerCacheConfig::default(),
            &RegistryConfig {
                file_path: server_dir.path().join("course-registry.json"),
                ..Default::default()
            },
        )
        .await
        .unwrap(),
    );

    let router = create_router(AppState {
        catalog: Arc::clone(&catalog),
        sessions: Arc::new(UploadSessions::new(Duration::from_secs(60))),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client_dir = tempfile::tempdir().unwrap();
    let client = DraftSyncClient::open(
        &StorageConfig {
            data_dir: client_dir.path().to_path_buf(),
            ..Default::default()
        },
        SyncConfig {
            server_url: format!("http://{}", addr),
            max_chunk_size,
            request_timeout_ms: Some(10_000),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    Harness {
        client,
        catalog,
        _server_dir: server_dir,
        _client_dir: client_dir,
    }
}

/// A course whose gzip output stays large: lesson bodies are pseudo-random text.
fn large_course(title: &str, lessons: usize) -> Value {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut word = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        format!("{:x}", seed)
    };
    let lessons: Vec<Value> = (0..lessons)
        .map(|i| {
            let body: Vec<String> = (0..40).map(|_| word()).collect();
            json!({"id": format!("l{}", i), "body": body.join(" ")})
        })
        .collect();
    json!({"title": title, "sections": [{"id": "s1", "lessons": lessons}]})
}

#[tokio::test]
async fn test_checkpoint_marks_drafts_synced() {
    let h = harness(3 * 1024 * 1024).await;

    h.client
        .drafts
        .save_draft_local("course-1", json!({"title": "Geometry", "sections": []}))
        .await
        .unwrap();
    h.client
        .drafts
        .save_draft_local("course-2", json!({"title": "Physics"}))
        .await
        .unwrap();

    let summary = h.client.checkpoint.run_checkpoint().await;
    assert_eq!(summary, SyncSummary { synced: 2, failed: 0 });
    assert!(h.client.drafts.get_all_dirty_drafts().await.unwrap().is_empty());

    let pointer = h
        .catalog
        .pointer("course-1", Some(Namespace::Draft))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.meta.title, "Geometry");

    // Nothing dirty: the next pass uploads nothing
    let summary = h.client.checkpoint.run_checkpoint().await;
    assert_eq!(summary, SyncSummary::default());
}

#[tokio::test]
async fn test_chunked_publish_round_trip() {
    // Small chunks force the chunked protocol
    let h = harness(16 * 1024).await;
    let course = large_course("Big Course", 200);

    h.client
        .drafts
        .save_draft_local("course-big", course.clone())
        .await
        .unwrap();
    let response = h.client.checkpoint.publish_course("course-big").await.unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["operation"], "publish");

    let (pointer, bytes) = h
        .catalog
        .document("course-big", Namespace::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.version, 1);
    let stored: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stored, course);
}

#[tokio::test]
async fn test_read_path_uses_cache_until_version_changes() {
    let h = harness(3 * 1024 * 1024).await;

    h.client
        .drafts
        .save_draft_local("course-1", json!({"title": "v1"}))
        .await
        .unwrap();
    h.client.checkpoint.publish_course("course-1").await.unwrap();

    let opened = h
        .client
        .reader
        .open_course("course-1", Namespace::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened.origin, ReadOrigin::Network);
    assert_eq!(opened.document["title"], "v1");

    let opened = h
        .client
        .reader
        .open_course("course-1", Namespace::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened.origin, ReadOrigin::Cache);

    h.client
        .drafts
        .save_draft_local("course-1", json!({"title": "v2"}))
        .await
        .unwrap();
    h.client.checkpoint.publish_course("course-1").await.unwrap();

    let opened = h
        .client
        .reader
        .open_course("course-1", Namespace::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened.origin, ReadOrigin::Network);
    assert_eq!(opened.document["title"], "v2");

    assert!(h
        .client
        .reader
        .open_course("never-published", Namespace::Published)
        .await
        .unwrap()
        .is_none());
}
