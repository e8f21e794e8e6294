//! Server Configuration
//!
//! ## Environment Variables
//!
//! - `DRAFTSYNC_PORT`: HTTP port (default: 8080)
//! - `DRAFTSYNC_DATA_DIR`: Root of blobs, records and the registry file (default: ./data/draftsync)
//! - `DRAFTSYNC_BLOB_BASE_URL`: Public base URL recorded in pointers (default: draftsync://blobs)
//! - `DRAFTSYNC_POINTER_TTL_SECS`: Pointer cache TTL (default: 300)
//! - `DRAFTSYNC_SYNC_INTERVAL_SECS`: Registry drain period (default: 300)
//! - `DRAFTSYNC_UPLOAD_SESSION_TTL_SECS`: Idle chunked upload sessions are dropped after this (default: 600)
//!
//! Unset or unparseable values fall back to the defaults.

use draftsync_metadata::{PointerCacheConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_blob_base_url")]
    pub blob_base_url: String,

    #[serde(default = "default_pointer_ttl_secs")]
    pub pointer_ttl_secs: u64,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_upload_session_ttl_secs")]
    pub upload_session_ttl_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/draftsync")
}

fn default_blob_base_url() -> String {
    "draftsync://blobs".to_string()
}

fn default_pointer_ttl_secs() -> u64 {
    300
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_upload_session_ttl_secs() -> u64 {
    600
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            blob_base_url: default_blob_base_url(),
            pointer_ttl_secs: default_pointer_ttl_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            upload_session_ttl_secs: default_upload_session_ttl_secs(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("DRAFTSYNC_PORT", defaults.port),
            data_dir: std::env::var("DRAFTSYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            blob_base_url: std::env::var("DRAFTSYNC_BLOB_BASE_URL")
                .unwrap_or(defaults.blob_base_url),
            pointer_ttl_secs: env_or("DRAFTSYNC_POINTER_TTL_SECS", defaults.pointer_ttl_secs),
            sync_interval_secs: env_or("DRAFTSYNC_SYNC_INTERVAL_SECS", defaults.sync_interval_secs),
            upload_session_ttl_secs: env_or(
                "DRAFTSYNC_UPLOAD_SESSION_TTL_SECS",
                defaults.upload_session_ttl_secs,
            ),
        }
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn pointer_cache_config(&self) -> PointerCacheConfig {
        PointerCacheConfig {
            ttl_ms: (self.pointer_ttl_secs * 1000) as i64,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            file_path: self.data_dir.join("course-registry.json"),
            drain_interval_secs: self.sync_interval_secs,
            ..Default::default()
        }
    }

    pub fn upload_session_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_session_ttl_secs)
    }
}
