//! Course Read Path
//!
//! Opening a course consults the local read cache before the network:
//!
//! ```text
//! fetch pointer (version, hash)
//!     ├─ cache valid for (version, hash) → serve cached document
//!     └─ otherwise → fetch document → cache it → serve
//! ```
//!
//! When the pointer lookup itself fails (offline, server down) the last cached copy
//! is served if there is one, so a course opened before keeps opening.
//!
//! Cache entries are keyed `<namespace>/<course id>`: the draft and the published
//! copy of a course are cached side by side and an offline draft open never serves
//! the published document.

use crate::error::Result;
use crate::transport::CourseSource;
use draftsync_core::{Namespace, PointerEntry};
use draftsync_storage::ReadCache;
use serde_json::Value;
use std::sync::Arc;

/// Where an opened document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Cache matched the server's current pointer
    Cache,
    /// Downloaded and cached
    Network,
    /// Server unreachable, last cached copy served
    StaleCache,
}

#[derive(Debug, Clone)]
pub struct OpenedCourse {
    pub document: Value,
    pub origin: ReadOrigin,
}

/// Read-through access to course documents.
pub struct CourseReader {
    source: Arc<dyn CourseSource>,
    cache: Arc<ReadCache>,
}

impl CourseReader {
    pub fn new(source: Arc<dyn CourseSource>, cache: Arc<ReadCache>) -> Self {
        Self { source, cache }
    }

    /// Open a course in `namespace`. `None` if neither the server nor the cache has it.
    pub async fn open_course(
        &self,
        course_id: &str,
        namespace: Namespace,
    ) -> Result<Option<OpenedCourse>> {
        let key = cache_key(course_id, namespace);
        let pointer = match self.source.fetch_pointer(course_id, Some(namespace)).await {
            Ok(pointer) => pointer,
            Err(e) => {
                tracing::warn!(
                    course_id = %course_id,
                    namespace = %namespace,
                    error = %e,
                    "Pointer lookup failed, trying cache"
                );
                return match self.cache.get_document(&key).await? {
                    Some(document) => Ok(Some(OpenedCourse {
                        document,
                        origin: ReadOrigin::StaleCache,
                    })),
                    None => Err(e),
                };
            }
        };

        let Some(pointer) = pointer else {
            return Ok(None);
        };

        if let Some(document) = self.cached(&key, &pointer).await? {
            tracing::debug!(
                course_id = %course_id,
                version = pointer.version,
                "Serving course from cache"
            );
            return Ok(Some(OpenedCourse {
                document,
                origin: ReadOrigin::Cache,
            }));
        }

        let Some(fetched) = self.source.fetch_document(course_id, namespace).await? else {
            return Ok(None);
        };

        if let Err(e) = self
            .cache
            .set_document(&key, fetched.version, &fetched.hash, &fetched.document)
            .await
        {
            tracing::warn!(course_id = %course_id, error = %e, "Failed to cache fetched course");
        }

        Ok(Some(OpenedCourse {
            document: fetched.document,
            origin: ReadOrigin::Network,
        }))
    }

    async fn cached(&self, key: &str, pointer: &PointerEntry) -> Result<Option<Value>> {
        if !self
            .cache
            .is_cache_valid(key, pointer.version, pointer.hash.as_deref())
            .await
        {
            return Ok(None);
        }
        Ok(self.cache.get_document(key).await?)
    }
}

/// Read cache key of a course in one namespace
pub fn cache_key(course_id: &str, namespace: Namespace) -> String {
    format!("{}/{}", namespace.as_str(), course_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::transport::FetchedDocument;
    use async_trait::async_trait;
    use draftsync_core::{DocumentMeta, GzipCodec};
    use draftsync_storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeServer {
        document: Mutex<Option<FetchedDocument>>,
        offline: AtomicBool,
        document_fetches: AtomicUsize,
    }

    impl FakeServer {
        fn with(version: u64, hash: &str, document: Value) -> Self {
            Self {
                document: Mutex::new(Some(FetchedDocument {
                    version,
                    hash: hash.to_string(),
                    document,
                })),
                offline: AtomicBool::new(false),
                document_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CourseSource for FakeServer {
        async fn fetch_pointer(
            &self,
            _course_id: &str,
            _namespace: Option<Namespace>,
        ) -> Result<Option<PointerEntry>> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection refused".to_string()));
            }
            Ok(self.document.lock().unwrap().as_ref().map(|d| PointerEntry {
                remote_ref: "memory://blobs/x".to_string(),
                version: d.version,
                hash: Some(d.hash.clone()),
                meta: DocumentMeta::default(),
                sections: None,
                updated_at: 0,
            }))
        }

        async fn fetch_document(
            &self,
            _course_id: &str,
            _namespace: Namespace,
        ) -> Result<Option<FetchedDocument>> {
            self.document_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.document.lock().unwrap().clone())
        }
    }

    async fn cache() -> Arc<ReadCache> {
        Arc::new(
            ReadCache::open(
                Arc::new(MemoryStore::new("read-cache")),
                Arc::new(GzipCodec::new()),
                1024 * 1024,
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_second_open_is_served_from_cache() {
        let server = Arc::new(FakeServer::with(1, "h1", json!({"title": "Rust"})));
        let reader = CourseReader::new(server.clone(), cache().await);

        let first = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(first.origin, ReadOrigin::Network);

        let second = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(second.origin, ReadOrigin::Cache);
        assert_eq!(second.document["title"], "Rust");
        assert_eq!(server.document_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_version_invalidates_cache() {
        let server = Arc::new(FakeServer::with(1, "h1", json!({"v": 1})));
        let reader = CourseReader::new(server.clone(), cache().await);
        reader.open_course("c1", Namespace::Published).await.unwrap();

        *server.document.lock().unwrap() = Some(FetchedDocument {
            version: 2,
            hash: "h2".to_string(),
            document: json!({"v": 2}),
        });

        let opened = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(opened.origin, ReadOrigin::Network);
        assert_eq!(opened.document["v"], 2);
    }

    #[tokio::test]
    async fn test_offline_serves_stale_copy() {
        let server = Arc::new(FakeServer::with(1, "h1", json!({"v": 1})));
        let reader = CourseReader::new(server.clone(), cache().await);
        reader.open_course("c1", Namespace::Published).await.unwrap();

        server.offline.store(true, Ordering::SeqCst);
        let opened = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(opened.origin, ReadOrigin::StaleCache);

        // Never opened before: the network error surfaces
        assert!(reader.open_course("c2", Namespace::Published).await.is_err());
    }

    #[tokio::test]
    async fn test_offline_draft_never_serves_published_copy() {
        let server = Arc::new(FakeServer::with(1, "h1", json!({"title": "Live"})));
        let cache = cache().await;
        let reader = CourseReader::new(server.clone(), Arc::clone(&cache));
        reader.open_course("c1", Namespace::Published).await.unwrap();

        server.offline.store(true, Ordering::SeqCst);
        assert!(reader.open_course("c1", Namespace::Draft).await.is_err());
        let published = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(published.origin, ReadOrigin::StaleCache);
        assert_eq!(published.document["title"], "Live");

        // Both namespaces are cached side by side
        server.offline.store(false, Ordering::SeqCst);
        reader.open_course("c1", Namespace::Draft).await.unwrap();
        assert_eq!(cache.stats().await.entry_count, 2);
        let again = reader.open_course("c1", Namespace::Published).await.unwrap().unwrap();
        assert_eq!(again.origin, ReadOrigin::Cache);
    }

    #[tokio::test]
    async fn test_unknown_course() {
        let server = Arc::new(FakeServer::with(1, "h1", json!({})));
        *server.document.lock().unwrap() = None;
        let reader = CourseReader::new(server, cache().await);
        assert!(reader.open_course("c1", Namespace::Draft).await.unwrap().is_none());
    }
}
