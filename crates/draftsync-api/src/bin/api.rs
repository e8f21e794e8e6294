//! DraftSync API Server Binary
//!
//! # Environment Variables
//!
//! See [`draftsync_api::config`]. `RUST_LOG` sets the log filter (default: info).
//!
//! # Example
//!
//! ```bash
//! export DRAFTSYNC_DATA_DIR=./data/draftsync
//! export DRAFTSYNC_PORT=8080
//! cargo run --bin draftsync-api
//! ```

use draftsync_api::{create_router, serve, ApiConfig, AppState, UploadSessions};
use draftsync_metadata::{CourseCatalog, ObjectBlobStore, ObjectRecordStore, SyncQueueTask};
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env();
    info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        blob_base_url = %config.blob_base_url,
        "DraftSync API starting"
    );

    // Blobs and pointer records share one local object store
    let blob_dir = config.blob_dir();
    tokio::fs::create_dir_all(&blob_dir).await?;
    let object_store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new_with_prefix(&blob_dir)?);

    let blobs = Arc::new(ObjectBlobStore::new(
        Arc::clone(&object_store),
        config.blob_base_url.clone(),
    ));
    let records = Arc::new(ObjectRecordStore::new(object_store, "records"));

    let registry_config = config.registry_config();
    let catalog = Arc::new(
        CourseCatalog::open(blobs, records, config.pointer_cache_config(), &registry_config).await?,
    );

    let sync_task = SyncQueueTask::new(
        Arc::clone(catalog.sync_queue()),
        registry_config.drain_interval(),
    );
    sync_task.start().await;

    let sessions = Arc::new(UploadSessions::new(config.upload_session_ttl()));
    let cleanup = sessions.start_cleanup(config.upload_session_ttl());

    let router = create_router(AppState { catalog, sessions });
    let result = serve(router, config.port).await;

    cleanup.abort();
    sync_task.stop().await;
    info!("DraftSync API stopped");
    result
}
