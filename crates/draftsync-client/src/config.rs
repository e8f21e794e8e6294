//! Client Configuration
//!
//! - **server_url**: Base URL of the DraftSync API (default: `http://localhost:8080`)
//! - **interval_secs**: Checkpoint interval (default: 30s)
//! - **max_chunk_size**: Payloads at or above this size go out chunked (default: 3MB)
//! - **request_timeout_ms**: Per-request timeout; `None` keeps the HTTP client default
//! - **compression**: Compress payloads before upload (default: true)

use draftsync_core::DEFAULT_MAX_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path of the upload endpoint under `server_url`
pub const UPLOAD_PATH: &str = "/api/v1/upload";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Seconds between checkpoint passes (default: 30)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Chunking threshold and chunk size in bytes (default: 3MB)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    #[serde(default = "default_compression")]
    pub compression: bool,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_compression() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            interval_secs: default_interval_secs(),
            max_chunk_size: default_max_chunk_size(),
            request_timeout_ms: None,
            compression: default_compression(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Full URL of the upload endpoint
    pub fn upload_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), UPLOAD_PATH)
    }

    /// URL of a per-course resource, e.g. `course_url("c1", "pointer")`
    pub fn course_url(&self, course_id: &str, resource: &str) -> String {
        format!(
            "{}/api/v1/courses/{}/{}",
            self.server_url.trim_end_matches('/'),
            course_id,
            resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.max_chunk_size, 3 * 1024 * 1024);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_urls() {
        let config = SyncConfig {
            server_url: "http://editor.local:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.upload_url(), "http://editor.local:9000/api/v1/upload");
        assert_eq!(
            config.course_url("c1", "document"),
            "http://editor.local:9000/api/v1/courses/c1/document"
        );
    }
}
