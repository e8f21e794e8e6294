//! DraftSync Client
//!
//! Network side of the course editor's offline draft pipeline: the checkpoint loop
//! that flushes dirty drafts, the upload protocol client it uses, and the read path
//! that serves courses through the local LRU cache.
//!
//! ## Components
//!
//! - [`Uploader`]: direct or chunked upload of a compressed payload
//! - [`CheckpointSync`]: periodic flush of dirty drafts, plus "sync now" and publish
//! - [`CourseReader`]: pointer check → read cache → network fetch
//! - [`HttpTransport`]: reqwest implementation of [`UploadTransport`] and [`CourseSource`]
//!
//! ## Example
//!
//! ```ignore
//! use draftsync_client::{DraftSyncClient, SyncConfig};
//! use draftsync_storage::StorageConfig;
//!
//! let client = DraftSyncClient::open(&StorageConfig::default(), SyncConfig::default()).await?;
//! client.checkpoint.start().await;
//!
//! client.drafts.save_draft_local("course-1", doc).await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod reader;
pub mod transport;
pub mod upload;

pub use checkpoint::{CheckpointSync, SyncSummary};
pub use config::SyncConfig;
pub use error::{ClientError, Result};
pub use reader::{cache_key, CourseReader, OpenedCourse, ReadOrigin};
pub use transport::{
    CourseSource, FetchedDocument, HttpTransport, UploadRequest, UploadTransport,
};
pub use upload::{UploadMode, UploadOutcome, Uploader};

use draftsync_core::select_codec;
use draftsync_storage::{DraftStore, LocalStorage, ReadCache, StorageConfig};
use std::sync::Arc;

/// Local stores and network components wired together over HTTP.
pub struct DraftSyncClient {
    pub drafts: Arc<DraftStore>,
    pub read_cache: Arc<ReadCache>,
    pub checkpoint: CheckpointSync,
    pub reader: CourseReader,
}

impl DraftSyncClient {
    /// Open the local stores and connect to the server described by `sync`.
    ///
    /// The checkpoint loop is not started.
    pub async fn open(storage: &StorageConfig, sync: SyncConfig) -> Result<Self> {
        let local = LocalStorage::open(storage).await?;
        let transport = Arc::new(HttpTransport::new(sync.clone())?);

        let uploader = Uploader::new(
            transport.clone(),
            select_codec(sync.compression),
            sync.max_chunk_size,
        );
        let checkpoint = CheckpointSync::new(local.drafts.clone(), uploader, sync.interval());
        let reader = CourseReader::new(transport, local.read_cache.clone());

        tracing::info!(
            server_url = %sync.server_url,
            data_dir = %storage.data_dir.display(),
            "DraftSync client ready"
        );

        Ok(Self {
            drafts: local.drafts,
            read_cache: local.read_cache,
            checkpoint,
            reader,
        })
    }
}
