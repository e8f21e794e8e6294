//! Blob Store
//!
//! Durable storage for serialized course documents and the registry snapshot.
//! Blobs are addressed by public URL; the URL is what pointer records carry as
//! `remoteRef`.
//!
//! [`ObjectBlobStore`] maps URLs onto any `object_store` backend:
//!
//! ```text
//! base_url  = https://cdn.example.com/course-blobs
//! name      = courses/c1/v3.json
//! url       = https://cdn.example.com/course-blobs/courses/c1/v3.json
//! path      = courses/c1/v3.json   (inside the object store)
//! ```

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;

/// A listed blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub url: String,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Public URL a blob named `name` has (or would have)
    fn url_for(&self, name: &str) -> String;

    /// Write (overwrite) a blob and return its URL
    async fn put(&self, name: &str, data: Bytes) -> Result<String>;

    /// Blobs whose name starts with the path prefix `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>>;

    /// Delete by URL. Deleting a missing blob is not an error.
    async fn delete(&self, url: &str) -> Result<()>;

    /// Read by URL. A missing blob is `NotFound`.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// [`BlobStore`] over an `object_store` backend (S3, local filesystem, in-memory).
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    base_url: String,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { store, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path_for(&self, url: &str) -> Result<ObjectPath> {
        url.strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty())
            .map(ObjectPath::from)
            .ok_or_else(|| MetadataError::InvalidReference(url.to_string()))
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<String> {
        let path = ObjectPath::from(name);
        let size = data.len();
        self.store.put(&path, data.into()).await?;

        tracing::debug!(path = %path, size, "Stored blob");
        Ok(self.url_for(name))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        let prefix = ObjectPath::from(prefix);
        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        Ok(objects
            .into_iter()
            .map(|meta| BlobInfo {
                url: self.url_for(meta.location.as_ref()),
                size: meta.size as u64,
            })
            .collect())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let path = self.path_for(url)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let path = self.path_for(url)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(MetadataError::NotFound(url.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn blobs() -> ObjectBlobStore {
        ObjectBlobStore::new(Arc::new(InMemory::new()), "memory://blobs/")
    }

    #[tokio::test]
    async fn test_put_fetch_delete() {
        let blobs = blobs();
        let url = blobs
            .put("courses/c1/v1.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(url, "memory://blobs/courses/c1/v1.json");
        assert_eq!(blobs.fetch(&url).await.unwrap(), Bytes::from_static(b"{}"));

        blobs.delete(&url).await.unwrap();
        blobs.delete(&url).await.unwrap();
        assert!(matches!(
            blobs.fetch(&url).await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let blobs = blobs();
        blobs.put("courses/c1/v1.json", Bytes::from_static(b"1")).await.unwrap();
        blobs.put("courses/c1/v2.json", Bytes::from_static(b"22")).await.unwrap();
        blobs.put("courses/c2/v1.json", Bytes::from_static(b"333")).await.unwrap();

        let mut listed = blobs.list("courses/c1").await.unwrap();
        listed.sort_by(|a, b| a.url.cmp(&b.url));
        assert_eq!(
            listed,
            vec![
                BlobInfo {
                    url: "memory://blobs/courses/c1/v1.json".to_string(),
                    size: 1
                },
                BlobInfo {
                    url: "memory://blobs/courses/c1/v2.json".to_string(),
                    size: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_foreign_reference_rejected() {
        let blobs = blobs();
        let err = blobs
            .fetch("https://elsewhere.example.com/courses/c1/v1.json")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidReference(_)));
        assert!(blobs.delete("memory://blobs/").await.is_err());
    }
}
