//! Metadata Error Types
//!
//! ## Error Categories
//!
//! ### Primary Store Errors
//! - `QuotaExhausted`: The record store refused the operation for quota reasons.
//!   Writes divert to the local registry; reads serve the last good snapshot.
//! - `Backend`: Any other record store failure, carried as an opaque message
//!
//! ### Blob Errors
//! - `NotFound`: No blob at the given reference
//! - `InvalidReference`: The reference does not belong to this blob store
//! - `ObjectStore`: Underlying object store failure
//!
//! ### Data Errors
//! - `InvalidDocument`: Uploaded bytes are not a JSON course document
//! - `Serialization`: A record could not be encoded or decoded
//!
//! ## Quota Detection
//!
//! Backends do not always surface quota problems as a dedicated variant. Use
//! [`MetadataError::is_quota_exhausted`], which also recognizes the usual markers
//! (`quota`, `RESOURCE_EXHAUSTED`, `resource-exhausted`) in opaque messages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Record store error: {0}")]
    Backend(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// True if the primary store rejected the call because its quota is used up
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            MetadataError::QuotaExhausted(_) => true,
            MetadataError::Backend(msg) => message_signals_quota(msg),
            MetadataError::ObjectStore(e) => message_signals_quota(&e.to_string()),
            _ => false,
        }
    }
}

fn message_signals_quota(message: &str) -> bool {
    message.to_ascii_lowercase().contains("quota")
        || message.contains("RESOURCE_EXHAUSTED")
        || message.contains("resource-exhausted")
}
