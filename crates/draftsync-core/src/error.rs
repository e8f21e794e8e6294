//! Error Types for DraftSync Core
//!
//! ## Error Categories
//!
//! ### Codec Errors
//! - `Compression`: The codec failed to compress a payload
//! - `Decompression`: The payload is not valid for the codec (likely truncated or corrupt)
//! - `PayloadTooLarge`: The decoded payload exceeds the allowed size
//!
//! ### Chunking Errors
//! - `InvalidChunkSize`: A chunk size of zero was requested
//! - `ChunkOutOfRange`: A chunk index beyond the announced total
//! - `ChunkMissing`: Reassembly attempted before every chunk arrived
//!
//! ### Data Errors
//! - `Serialization`: A document could not be serialized or parsed as JSON
//!
//! ## Usage
//! All functions in this crate return `Result<T>` which is aliased to `Result<T, Error>`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Payload exceeds {limit} bytes once decoded")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Chunk index {index} out of range (total {total})")]
    ChunkOutOfRange { index: usize, total: usize },

    #[error("Chunk {index} of {total} missing")]
    ChunkMissing { index: usize, total: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
