//! DraftSync Core
//!
//! Shared building blocks for the offline draft cache and checkpoint-sync pipeline
//! behind the course content editor.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ┌──────────────┐  edit   ┌──────────────┐  every 30s  ┌────────────────┐
//! │  Editor UI   │ ──────→ │ Draft Store  │ ──────────→ │ Checkpoint Loop │
//! └──────────────┘         └──────────────┘   (dirty)   └───────┬────────┘
//!                                                                │ serialize
//!                                                                ▼
//!                                                       ┌────────────────┐
//!                                                       │     codec      │ ◄── here
//!                                                       └───────┬────────┘
//!                                                               │ < 3 MiB ? direct : chunked
//!                                                               ▼
//!                                                       ┌────────────────┐
//!                                                       │     chunk      │ ◄── here
//!                                                       └───────┬────────┘
//!                                                               ▼
//!                                                        upload endpoint
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: injected compression codec with an uncompressed fallback
//! - [`chunk`]: splitting payloads under the request ceiling and reassembling them
//! - [`types`]: draft, cache, pointer and registry records shared by client and server

pub mod chunk;
pub mod codec;
pub mod error;
pub mod types;

pub use chunk::{
    chunk_count, needs_chunking, split_chunks, ChunkAssembler, DEFAULT_MAX_CHUNK_SIZE,
    REQUEST_SIZE_CEILING,
};
pub use codec::{
    compress_text, decompress_payload, decompress_payload_limited, is_gzip, select_codec, Codec,
    Compressed, ContentEncoding, GzipCodec, IdentityCodec, MAX_DOCUMENT_SIZE,
};
pub use error::{Error, Result};
pub use types::{
    content_hash, document_sections, now_ms, CachedDocument, DocumentMeta, DraftEntry,
    Namespace, Operation, PointerEntry, RegistryEntry,
};
