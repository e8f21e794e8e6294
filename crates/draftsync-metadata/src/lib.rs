//! DraftSync Metadata
//!
//! Server-side bookkeeping of where every course document lives.
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────────────────────────────────────┐
//!  upload ─────→ │               CourseCatalog                │
//!                └──┬──────────────┬───────────────┬──────────┘
//!                   │ blob         │ pointer       │ quota exhausted
//!                   ▼              ▼               ▼
//!             ┌──────────┐  ┌─────────────┐  ┌───────────────┐
//!             │BlobStore │  │ RecordStore │◄─│ LocalRegistry │
//!             └──────────┘  └──────┬──────┘  └───────▲───────┘
//!                                  │ list            │ pending
//!                           ┌──────▼───────┐  ┌──────┴──────┐
//!                           │ PointerCache │◄─│  SyncQueue  │ invalidate
//!                           └──────────────┘  └─────────────┘
//! ```
//!
//! - [`blob`]: durable document blobs addressed by URL
//! - [`record`]: primary store of pointer records (`published_courses`, `draft_courses`)
//! - [`pointer_cache`]: TTL snapshot of both pointer collections, stale-on-quota
//! - [`registry`]: layered fallback store for pointers the primary store refused
//! - [`sync_queue`]: drains the registry back into the primary store
//! - [`catalog`]: the context tying them together

pub mod blob;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pointer_cache;
pub mod record;
pub mod registry;
pub mod sync_queue;

pub use blob::{BlobInfo, BlobStore, ObjectBlobStore};
pub use catalog::{CourseCatalog, DeleteOutcome, SaveOutcome};
pub use config::{PointerCacheConfig, RegistryConfig};
pub use error::{MetadataError, Result};
pub use pointer_cache::{PointerCache, PointerCacheMetrics, PointerSnapshot};
pub use record::{
    collection_for, MemoryRecordStore, ObjectRecordStore, RecordStore, DRAFT_COURSES,
    PUBLISHED_COURSES,
};
pub use registry::{BlobTier, FileTier, LocalRegistry, RegistryTier, TierWrite};
pub use sync_queue::{SyncQueue, SyncQueueReport, SyncQueueTask};
