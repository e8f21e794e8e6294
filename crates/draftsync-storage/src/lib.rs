//! DraftSync Storage
//!
//! Client-side persistence for the course editor: the local draft store that
//! guarantees no edit is lost, and the size-bounded LRU cache of previously fetched
//! documents.
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/
//!     drafts/        DraftStore  (one entry per course, dirty/clean)
//!     read-cache/    ReadCache   (meta/<id> + blob/<id>, LRU by lastAccessed)
//! ```
//!
//! Both sit on the [`LocalStore`] trait; [`FileStore`] is used in production and
//! [`MemoryStore`] in tests.
//!
//! ## Usage
//!
//! ```ignore
//! use draftsync_storage::{LocalStorage, StorageConfig};
//!
//! let storage = LocalStorage::open(&StorageConfig::default()).await?;
//! storage.drafts.save_draft_local("course-1", doc).await?;
//! ```

pub mod config;
pub mod draft_store;
pub mod error;
pub mod local_store;
pub mod read_cache;

pub use config::StorageConfig;
pub use draft_store::DraftStore;
pub use error::{Result, StorageError};
pub use local_store::{FileStore, LocalStore, MemoryStore, SCHEMA_VERSION};
pub use read_cache::{CacheStats, ReadCache};

use draftsync_core::select_codec;
use std::sync::Arc;

/// Both client-side stores, opened from one configuration.
pub struct LocalStorage {
    pub drafts: Arc<DraftStore>,
    pub read_cache: Arc<ReadCache>,
}

impl LocalStorage {
    /// Open (or create) the file-backed stores under `config.data_dir`.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let drafts_store = FileStore::open(&config.data_dir, &config.drafts_store).await?;
        let cache_store = FileStore::open(&config.data_dir, &config.read_cache_store).await?;

        let read_cache = ReadCache::open(
            Arc::new(cache_store),
            select_codec(config.compress_cached_documents),
            config.read_cache_max_bytes,
        )
        .await?;

        Ok(Self {
            drafts: Arc::new(DraftStore::new(Arc::new(drafts_store))),
            read_cache: Arc::new(read_cache),
        })
    }
}
