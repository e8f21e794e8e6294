//! Error types for DraftSync client operations.
//!
//! ## Error Handling Strategy
//!
//! - **Transient errors**: `Transport`, `Http`, `ChunkFailed`. The checkpoint loop
//!   logs them, leaves the draft dirty and retries on the next tick.
//! - **Server rejections**: `Rejected` (2xx with `success: false`), `InvalidResponse`
//! - **Caller errors**: `DraftNotFound`, `Config`
//! - **Local errors**: `Storage`, `Codec`, `Serialization`

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced an HTTP response (DNS, connect, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status
    #[error("Server returned {status}: {body}")]
    Http { status: u16, body: String },

    /// A chunk of a chunked upload failed; the whole upload is aborted
    #[error("Chunk {index} of {total} failed: {reason}")]
    ChunkFailed {
        index: usize,
        total: usize,
        reason: String,
    },

    /// The server accepted the request but reported failure
    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("No local draft for course '{0}'")]
    DraftNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local storage error: {0}")]
    Storage(#[from] draftsync_storage::StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] draftsync_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of a failed request, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
