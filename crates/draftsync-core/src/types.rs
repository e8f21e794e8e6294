//! Data Model
//!
//! Shared records for both halves of the pipeline:
//!
//! - **Client side**: [`DraftEntry`] (local draft store) and [`CachedDocument`]
//!   (LRU read cache). Both are keyed by document id but never reference each other.
//! - **Server side**: [`PointerEntry`] (where the durable blob for a document lives,
//!   as recorded in the primary record store) and [`RegistryEntry`] (the same
//!   information parked in the local fallback registry while the primary store is
//!   unavailable).
//!
//! Everything that crosses a process boundary serializes with camelCase field names.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Lowercase hex SHA-256 of a serialized document.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A locally edited document waiting to be (or already) checkpointed.
///
/// `dirty` is true whenever `last_modified > synced_at` (or `synced_at` is unset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEntry {
    pub document_id: String,
    /// Full current editable state, not a diff
    pub document: Value,
    pub last_modified: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<i64>,
    pub dirty: bool,
}

/// A previously fetched document held by the read cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    pub document_id: String,
    pub version: u64,
    pub hash: String,
    /// Compact representation; compressed when `is_compressed` is set
    pub blob: Bytes,
    pub is_compressed: bool,
    pub last_accessed: i64,
    pub size_bytes: u64,
}

/// Which pointer map a document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Published,
    Draft,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Published => "published",
            Namespace::Draft => "draft",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(Namespace::Published),
            "draft" => Ok(Namespace::Draft),
            other => Err(format!("unknown namespace: {}", other)),
        }
    }
}

/// Server-side operation requested by an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Draft save
    #[default]
    Checkpoint,
    /// Publish flow
    Publish,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Checkpoint => "checkpoint",
            Operation::Publish => "publish",
        }
    }

    /// Pointer namespace written by this operation
    pub fn namespace(&self) -> Namespace {
        match self {
            Operation::Checkpoint => Namespace::Draft,
            Operation::Publish => Namespace::Published,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkpoint" => Ok(Operation::Checkpoint),
            "publish" => Ok(Operation::Publish),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

/// Denormalized course metadata kept next to a pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl DocumentMeta {
    /// Pull the well-known top-level fields out of a course document.
    ///
    /// Missing or non-string fields are left empty; the document itself stays opaque.
    pub fn from_document(document: &Value) -> Self {
        let text = |key: &str| {
            document
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            title: text("title").unwrap_or_default(),
            description: text("description"),
            thumbnail: text("thumbnail"),
            owner: text("owner"),
            category: text("category"),
            level: text("level"),
        }
    }
}

/// Top-level `sections` array of a course document, if it has one.
pub fn document_sections(document: &Value) -> Option<Vec<Value>> {
    document.get("sections").and_then(Value::as_array).cloned()
}

/// Where the durable blob for a document lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEntry {
    pub remote_ref: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub meta: DocumentMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Value>>,
    #[serde(default)]
    pub updated_at: i64,
}

/// Fallback registry record for a pointer the primary store did not accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub document_id: String,
    pub remote_ref: String,
    #[serde(default)]
    pub meta: DocumentMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Value>>,
    #[serde(default)]
    pub namespace: Namespace,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub created_at: i64,
    pub pending_sync: bool,
}

impl RegistryEntry {
    /// Pointer record equivalent to this registry entry
    pub fn to_pointer(&self) -> PointerEntry {
        PointerEntry {
            remote_ref: self.remote_ref.clone(),
            version: self.version,
            hash: self.hash.clone(),
            meta: self.meta.clone(),
            sections: self.sections.clone(),
            updated_at: self.created_at,
        }
    }
}
