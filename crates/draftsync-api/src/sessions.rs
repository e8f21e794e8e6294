//! Chunked Upload Sessions
//!
//! `action=init` opens a session holding a [`ChunkAssembler`]; chunks are stored by
//! index; `action=complete` hands the finished session to the save path.
//!
//! Sessions live only in this process. An upload interrupted by a restart or left
//! idle longer than the TTL is dropped, and the client starts over on its next
//! checkpoint tick.
//!
//! Memory held by sessions is bounded three ways: at most `max_sessions` open
//! uploads (503 beyond that), at most `MAX_DOCUMENT_SIZE` buffered per upload (413,
//! and the session is dropped) and at most `max_buffered_bytes` across all uploads
//! (503).

use crate::error::{ApiError, Result};
use bytes::Bytes;
use draftsync_core::{ChunkAssembler, ContentEncoding, Operation, MAX_DOCUMENT_SIZE};
use draftsync_observability::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Most chunks one upload may announce
pub const MAX_TOTAL_CHUNKS: usize = 1024;

/// Default cap on concurrently open uploads
pub const MAX_OPEN_SESSIONS: usize = 64;

/// Default cap on chunk bytes buffered across all open uploads (512 MiB)
pub const MAX_BUFFERED_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug)]
pub struct UploadSession {
    pub course_id: String,
    pub operation: Operation,
    pub encoding: ContentEncoding,
    pub assembler: ChunkAssembler,
    last_activity: Instant,
}

pub struct UploadSessions {
    sessions: RwLock<HashMap<String, UploadSession>>,
    ttl: Duration,
    max_sessions: usize,
    max_buffered_bytes: usize,
}

impl UploadSessions {
    pub fn new(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_OPEN_SESSIONS, MAX_BUFFERED_BYTES)
    }

    pub fn with_limits(ttl: Duration, max_sessions: usize, max_buffered_bytes: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions,
            max_buffered_bytes,
        }
    }

    /// Open a session and return its upload id.
    pub async fn open(
        &self,
        course_id: &str,
        total_chunks: usize,
        operation: Operation,
        encoding: ContentEncoding,
    ) -> Result<String> {
        if total_chunks == 0 || total_chunks > MAX_TOTAL_CHUNKS {
            return Err(ApiError::BadRequest(format!(
                "totalChunks must be between 1 and {}, got {}",
                MAX_TOTAL_CHUNKS, total_chunks
            )));
        }

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            tracing::warn!(
                open = sessions.len(),
                course_id,
                "Upload session limit reached"
            );
            return Err(ApiError::Busy(format!(
                "Too many uploads in progress ({}), retry later",
                sessions.len()
            )));
        }

        let upload_id = uuid::Uuid::new_v4().to_string();
        sessions.insert(
            upload_id.clone(),
            UploadSession {
                course_id: course_id.to_string(),
                operation,
                encoding,
                assembler: ChunkAssembler::new(total_chunks),
                last_activity: Instant::now(),
            },
        );
        metrics::UPLOAD_SESSIONS_ACTIVE.set(sessions.len() as i64);

        tracing::debug!(
            upload_id = %upload_id,
            course_id,
            total_chunks,
            operation = %operation,
            "Chunked upload opened"
        );
        Ok(upload_id)
    }

    /// Store one chunk. Returns `(received, total)`.
    pub async fn add_chunk(
        &self,
        upload_id: &str,
        index: usize,
        data: Bytes,
    ) -> Result<(usize, usize)> {
        let mut sessions = self.sessions.write().await;
        let buffered: usize = sessions
            .values()
            .map(|s| s.assembler.received_bytes())
            .sum();
        let session_bytes = sessions
            .get(upload_id)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown upload: {}", upload_id)))?
            .assembler
            .received_bytes();

        if session_bytes + data.len() > MAX_DOCUMENT_SIZE {
            sessions.remove(upload_id);
            metrics::UPLOAD_SESSIONS_ACTIVE.set(sessions.len() as i64);
            return Err(ApiError::PayloadTooLarge(format!(
                "Upload {} exceeds {} bytes",
                upload_id, MAX_DOCUMENT_SIZE
            )));
        }
        if buffered + data.len() > self.max_buffered_bytes {
            return Err(ApiError::Busy("Upload buffer full, retry later".to_string()));
        }

        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown upload: {}", upload_id)))?;
        session.assembler.insert(index, data)?;
        session.last_activity = Instant::now();
        Ok((session.assembler.received(), session.assembler.total()))
    }

    /// Close a session whose chunks have all arrived. An incomplete session is kept.
    pub async fn finish(&self, upload_id: &str) -> Result<UploadSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get(upload_id)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown upload: {}", upload_id)))?;

        if !session.assembler.is_complete() {
            return Err(ApiError::BadRequest(format!(
                "Upload {} incomplete: {} of {} chunks received",
                upload_id,
                session.assembler.received(),
                session.assembler.total()
            )));
        }

        let session = sessions
            .remove(upload_id)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown upload: {}", upload_id)))?;
        metrics::UPLOAD_SESSIONS_ACTIVE.set(sessions.len() as i64);
        Ok(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for longer than the TTL. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|upload_id, session| {
            let keep = session.last_activity.elapsed() < self.ttl;
            if !keep {
                tracing::info!(
                    upload_id = %upload_id,
                    course_id = %session.course_id,
                    received = session.assembler.received(),
                    total = session.assembler.total(),
                    "Dropping expired upload session"
                );
            }
            keep
        });
        metrics::UPLOAD_SESSIONS_ACTIVE.set(sessions.len() as i64);
        before - sessions.len()
    }

    /// Run `cleanup_expired` every `every` until the handle is aborted.
    pub fn start_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sessions.cleanup_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_then_finish() {
        let sessions = UploadSessions::new(Duration::from_secs(60));
        let id = sessions
            .open("c1", 2, Operation::Publish, ContentEncoding::Gzip)
            .await
            .unwrap();

        assert_eq!(
            sessions.add_chunk(&id, 1, Bytes::from_static(b"world")).await.unwrap(),
            (1, 2)
        );
        // Incomplete sessions survive a premature complete
        assert!(matches!(
            sessions.finish(&id).await,
            Err(ApiError::BadRequest(_))
        ));
        sessions.add_chunk(&id, 0, Bytes::from_static(b"hello ")).await.unwrap();

        let session = sessions.finish(&id).await.unwrap();
        assert_eq!(session.course_id, "c1");
        assert_eq!(session.operation, Operation::Publish);
        assert_eq!(session.assembler.assemble().unwrap(), Bytes::from_static(b"hello world"));
        assert!(sessions.is_empty().await);
        assert!(matches!(
            sessions.finish(&id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let sessions = UploadSessions::new(Duration::from_secs(60));
        assert!(sessions
            .open("c1", 0, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .is_err());
        assert!(sessions
            .open("c1", MAX_TOTAL_CHUNKS + 1, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .is_err());

        let id = sessions
            .open("c1", 1, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .unwrap();
        assert!(matches!(
            sessions.add_chunk(&id, 5, Bytes::new()).await,
            Err(ApiError::Payload(_))
        ));
        assert!(matches!(
            sessions.add_chunk("nope", 0, Bytes::new()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_and_buffer_limits() {
        let sessions = UploadSessions::with_limits(Duration::from_secs(60), 2, 10);
        let a = sessions
            .open("c1", 2, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .unwrap();
        let b = sessions
            .open("c2", 2, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .unwrap();
        assert!(matches!(
            sessions
                .open("c3", 1, Operation::Checkpoint, ContentEncoding::Identity)
                .await,
            Err(ApiError::Busy(_))
        ));

        sessions.add_chunk(&a, 0, Bytes::from_static(b"123456")).await.unwrap();
        assert!(matches!(
            sessions.add_chunk(&b, 0, Bytes::from_static(b"123456")).await,
            Err(ApiError::Busy(_))
        ));
        sessions.add_chunk(&b, 0, Bytes::from_static(b"1234")).await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_upload_is_dropped() {
        let sessions = UploadSessions::new(Duration::from_secs(60));
        let id = sessions
            .open("c1", 2, Operation::Publish, ContentEncoding::Identity)
            .await
            .unwrap();

        let oversized = Bytes::from(vec![0u8; MAX_DOCUMENT_SIZE + 1]);
        assert!(matches!(
            sessions.add_chunk(&id, 0, oversized).await,
            Err(ApiError::PayloadTooLarge(_))
        ));
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let sessions = UploadSessions::new(Duration::from_millis(20));
        sessions
            .open("c1", 1, Operation::Checkpoint, ContentEncoding::Identity)
            .await
            .unwrap();
        assert_eq!(sessions.cleanup_expired().await, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sessions.cleanup_expired().await, 1);
        assert_eq!(sessions.len().await, 0);
    }
}
