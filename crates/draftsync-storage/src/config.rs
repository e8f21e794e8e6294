//! Storage Configuration
//!
//! ## StorageConfig
//!
//! Controls where the client keeps its local caches and how big they may grow:
//!
//! - **data_dir**: Root directory; each logical store gets a subdirectory
//! - **drafts_store**: Store name for local drafts (default: "drafts")
//! - **read_cache_store**: Store name for the read cache (default: "read-cache")
//! - **read_cache_max_bytes**: LRU size cap for cached documents (default: 200MB)
//! - **compress_cached_documents**: Run cached documents through the codec (default: true)
//!
//! ## Usage
//!
//! ```ignore
//! use draftsync_storage::StorageConfig;
//!
//! let config = StorageConfig {
//!     data_dir: "/var/lib/editor".into(),
//!     read_cache_max_bytes: 50 * 1024 * 1024,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all local stores
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_drafts_store")]
    pub drafts_store: String,

    #[serde(default = "default_read_cache_store")]
    pub read_cache_store: String,

    /// Maximum total size of cached documents in bytes (default: 200MB)
    #[serde(default = "default_read_cache_max_bytes")]
    pub read_cache_max_bytes: u64,

    #[serde(default = "default_compress")]
    pub compress_cached_documents: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/draftsync")
}

fn default_drafts_store() -> String {
    "drafts".to_string()
}

fn default_read_cache_store() -> String {
    "read-cache".to_string()
}

fn default_read_cache_max_bytes() -> u64 {
    200 * 1024 * 1024 // 200MB
}

fn default_compress() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            drafts_store: default_drafts_store(),
            read_cache_store: default_read_cache_store(),
            read_cache_max_bytes: default_read_cache_max_bytes(),
            compress_cached_documents: default_compress(),
        }
    }
}
