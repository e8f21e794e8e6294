//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Availability Errors
//! - `StorageUnavailable`: The local persistence layer is blocked, disabled or gone.
//!   Surfaced to the immediate caller; the store never retries on its own.
//! - `SchemaVersion`: The on-disk store was written by a newer schema than this build
//!   understands.
//!
//! ### Data Errors
//! - `Serialization`: A stored record could not be encoded or decoded
//! - `Codec`: Compressing or inflating a cached blob failed
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, StorageError>`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Store schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] draftsync_core::Error),
}

impl StorageError {
    /// True if the local persistence layer itself could not be reached
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::StorageUnavailable(_) | StorageError::Io(_))
    }
}
