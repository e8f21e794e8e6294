//! Record Store
//!
//! The primary store for small pointer records, organized in collections:
//!
//! - `published_courses`: pointer to the latest published version of each course
//! - `draft_courses`: pointer to the latest draft checkpoint of each course
//!
//! `set(.., merge = true)` performs a shallow merge of object fields into an existing
//! record, matching document-database "set with merge" semantics.
//!
//! ## Implementations
//!
//! - [`MemoryRecordStore`]: in-process, with a switch that makes every call fail with
//!   `QuotaExhausted` (the fallback path is exercised this way in tests)
//! - [`ObjectRecordStore`]: one JSON object per record in an `object_store`

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use draftsync_core::Namespace;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const PUBLISHED_COURSES: &str = "published_courses";
pub const DRAFT_COURSES: &str = "draft_courses";

/// Collection holding pointers of `namespace`
pub fn collection_for(namespace: Namespace) -> &'static str {
    match namespace {
        Namespace::Published => PUBLISHED_COURSES,
        Namespace::Draft => DRAFT_COURSES,
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Write a record. With `merge`, object fields are merged into the existing record.
    async fn set(&self, collection: &str, id: &str, value: Value, merge: bool) -> Result<()>;

    /// Every `(id, record)` in a collection
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Shallow merge of `update` into `existing` when both are objects
fn merge_record(existing: Option<Value>, update: Value, merge: bool) -> Value {
    match (merge, existing, update) {
        (true, Some(Value::Object(mut base)), Value::Object(fields)) => {
            for (key, value) in fields {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, _, update) => update,
    }
}

/// In-process record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    quota_exhausted: AtomicBool,
    writes: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or stop failing) with `QuotaExhausted`
    pub fn set_quota_exhausted(&self, exhausted: bool) {
        self.quota_exhausted.store(exhausted, Ordering::SeqCst);
    }

    /// Number of successful `set` calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_quota(&self) -> Result<()> {
        if self.quota_exhausted.load(Ordering::SeqCst) {
            Err(MetadataError::QuotaExhausted(
                "RESOURCE_EXHAUSTED: daily quota exceeded".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.check_quota()?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, value: Value, merge: bool) -> Result<()> {
        self.check_quota()?;
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        let merged = merge_record(records.remove(id), value, merge);
        records.insert(id.to_string(), merged);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        self.check_quota()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_quota()?;
        if let Some(records) = self.collections.write().await.get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }
}

/// Records stored as `<prefix>/<collection>/<id>.json` objects.
pub struct ObjectRecordStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectRecordStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn collection_path(&self, collection: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(collection)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, collection))
        }
    }

    fn record_path(&self, collection: &str, id: &str) -> ObjectPath {
        self.collection_path(collection)
            .child(format!("{}.json", id))
    }

    async fn read(&self, path: &ObjectPath) -> Result<Option<Value>> {
        match self.store.get(path).await {
            Ok(result) => {
                let raw = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for ObjectRecordStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.read(&self.record_path(collection, id)).await
    }

    async fn set(&self, collection: &str, id: &str, value: Value, merge: bool) -> Result<()> {
        let path = self.record_path(collection, id);
        let existing = if merge { self.read(&path).await? } else { None };
        let record = merge_record(existing, value, merge);

        let raw = serde_json::to_vec(&record)?;
        self.store.put(&path, bytes::Bytes::from(raw).into()).await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let prefix = self.collection_path(collection);
        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        let mut records = Vec::with_capacity(objects.len());
        for meta in objects {
            let Some(id) = meta
                .location
                .filename()
                .and_then(|name| name.strip_suffix(".json"))
                .map(str::to_string)
            else {
                continue;
            };
            if let Some(value) = self.read(&meta.location).await? {
                records.push((id, value));
            }
        }
        Ok(records)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        match self.store.delete(&self.record_path(collection, id)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
