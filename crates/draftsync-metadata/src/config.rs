//! Server-side Metadata Configuration
//!
//! ## PointerCacheConfig
//! - **ttl_ms**: How long a loaded pointer snapshot is served before reloading (default: 5 min)
//!
//! ## RegistryConfig
//! - **file_path**: Local file tier of the fallback registry
//! - **blob_name**: Blob tier object name (default: `course-registry.json`)
//! - **drain_interval_secs**: Period of the background sync queue drain (default: 5 min)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerCacheConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: i64,
}

fn default_ttl_ms() -> i64 {
    5 * 60 * 1000 // 5 minutes
}

impl Default for PointerCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,

    #[serde(default = "default_blob_name")]
    pub blob_name: String,

    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
}

fn default_file_path() -> PathBuf {
    PathBuf::from("./data/draftsync/course-registry.json")
}

fn default_blob_name() -> String {
    "course-registry.json".to_string()
}

fn default_drain_interval_secs() -> u64 {
    5 * 60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            file_path: default_file_path(),
            blob_name: default_blob_name(),
            drain_interval_secs: default_drain_interval_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }
}
