//! Upload Protocol Client
//!
//! Decides between a single direct POST and a chunked upload, based on the size of
//! the (possibly compressed) payload:
//!
//! ```text
//! payload < max_chunk_size  → direct  (1 request)
//! payload ≥ max_chunk_size  → init → chunk 0 … chunk n-1 → complete  (n + 2 requests)
//! ```
//!
//! Chunks are sent sequentially and in index order. The first failing chunk aborts
//! the upload with [`ClientError::ChunkFailed`]; nothing is retried here. The
//! checkpoint loop retries the whole document on its next tick.

use crate::error::{ClientError, Result};
use crate::transport::{UploadRequest, UploadTransport};
use draftsync_core::{
    compress_text, needs_chunking, split_chunks, Codec, Compressed, Operation,
};
use draftsync_observability::metrics;
use serde_json::Value;
use std::sync::Arc;

/// How a payload was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Direct,
    Chunked { chunks: usize },
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Direct => "direct",
            UploadMode::Chunked { .. } => "chunked",
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub mode: UploadMode,
    pub bytes_sent: u64,
    /// JSON body returned by the server for the operation
    pub response: Value,
}

/// Serializes, compresses and uploads documents.
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    codec: Arc<dyn Codec>,
    max_chunk_size: usize,
}

impl Uploader {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        codec: Arc<dyn Codec>,
        max_chunk_size: usize,
    ) -> Self {
        Self {
            transport,
            codec,
            max_chunk_size,
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Serialize `document`, compress it with the configured codec and upload it.
    #[tracing::instrument(skip_all, fields(course_id = %document_id, operation = %operation))]
    pub async fn upload_document(
        &self,
        document_id: &str,
        operation: Operation,
        document: &Value,
    ) -> Result<UploadOutcome> {
        let text = serde_json::to_string(document)?;
        let payload = compress_text(self.codec.as_ref(), &text);

        tracing::debug!(
            raw_size = text.len(),
            payload_size = payload.len(),
            compressed = payload.is_compressed,
            "Prepared upload payload"
        );

        self.upload_payload(document_id, operation, payload).await
    }

    /// Upload an already prepared payload, direct or chunked by size.
    pub async fn upload_payload(
        &self,
        document_id: &str,
        operation: Operation,
        payload: Compressed,
    ) -> Result<UploadOutcome> {
        let outcome = if needs_chunking(payload.len(), self.max_chunk_size) {
            self.upload_chunked(document_id, operation, payload).await?
        } else {
            self.upload_direct(document_id, operation, payload).await?
        };

        metrics::UPLOAD_BYTES_TOTAL
            .with_label_values(&[outcome.mode.as_str()])
            .inc_by(outcome.bytes_sent);

        Ok(outcome)
    }

    async fn upload_direct(
        &self,
        document_id: &str,
        operation: Operation,
        payload: Compressed,
    ) -> Result<UploadOutcome> {
        let bytes_sent = payload.len() as u64;
        let response = self
            .transport
            .send(UploadRequest::Direct {
                document_id: document_id.to_string(),
                operation,
                encoding: payload.encoding(),
                body: payload.bytes,
            })
            .await?;
        ensure_success(&response)?;

        tracing::debug!(course_id = %document_id, size = bytes_sent, "Direct upload completed");

        Ok(UploadOutcome {
            mode: UploadMode::Direct,
            bytes_sent,
            response,
        })
    }

    async fn upload_chunked(
        &self,
        document_id: &str,
        operation: Operation,
        payload: Compressed,
    ) -> Result<UploadOutcome> {
        let encoding = payload.encoding();
        let chunks = split_chunks(&payload.bytes, self.max_chunk_size)?;
        let total = chunks.len();

        tracing::debug!(
            course_id = %document_id,
            size = payload.len(),
            chunk_size = self.max_chunk_size,
            total,
            "Starting chunked upload"
        );

        let init = self
            .transport
            .send(UploadRequest::Init {
                document_id: document_id.to_string(),
                total_chunks: total,
                operation,
                encoding,
            })
            .await?;
        let upload_id = init
            .get("uploadId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::InvalidResponse("init response has no uploadId".to_string())
            })?
            .to_string();

        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::trace!(upload_id = %upload_id, index, size = chunk.len(), "Sending chunk");

            self.transport
                .send(UploadRequest::Chunk {
                    upload_id: upload_id.clone(),
                    index,
                    body: chunk,
                })
                .await
                .map_err(|e| ClientError::ChunkFailed {
                    index,
                    total,
                    reason: e.to_string(),
                })?;
        }

        let response = self
            .transport
            .send(UploadRequest::Complete {
                upload_id: upload_id.clone(),
            })
            .await?;
        ensure_success(&response)?;

        tracing::info!(
            course_id = %document_id,
            upload_id = %upload_id,
            size = payload.len(),
            chunks = total,
            "Chunked upload completed"
        );

        Ok(UploadOutcome {
            mode: UploadMode::Chunked { chunks: total },
            bytes_sent: payload.len() as u64,
            response,
        })
    }
}

/// A 2xx body that explicitly says `"success": false` is still a failure
fn ensure_success(response: &Value) -> Result<()> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("server reported failure")
            .to_string();
        return Err(ClientError::Rejected(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use draftsync_core::{GzipCodec, IdentityCodec};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every request; fails chunk `fail_chunk` if set
    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<UploadRequest>>,
        fail_chunk: Option<usize>,
    }

    impl RecordingTransport {
        fn kinds(&self) -> Vec<&'static str> {
            self.requests.lock().unwrap().iter().map(|r| r.kind()).collect()
        }

        fn chunk_sizes(&self) -> Vec<usize> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| match r {
                    UploadRequest::Chunk { body, .. } => Some(body.len()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl UploadTransport for RecordingTransport {
        async fn send(&self, request: UploadRequest) -> Result<Value> {
            let failing = matches!(
                &request,
                UploadRequest::Chunk { index, .. } if Some(*index) == self.fail_chunk
            );
            let response = match &request {
                UploadRequest::Init { .. } => json!({"uploadId": "up-1"}),
                UploadRequest::Chunk { index, .. } => json!({"received": index}),
                _ => json!({"success": true, "version": 1}),
            };
            self.requests.lock().unwrap().push(request);

            if failing {
                return Err(ClientError::Http {
                    status: 500,
                    body: "disk full".to_string(),
                });
            }
            Ok(response)
        }
    }

    fn payload(size: usize) -> Compressed {
        Compressed {
            bytes: Bytes::from(vec![b'x'; size]),
            is_compressed: true,
        }
    }

    #[tokio::test]
    async fn test_small_document_goes_direct() {
        let transport = Arc::new(RecordingTransport::default());
        let uploader = Uploader::new(
            transport.clone(),
            Arc::new(GzipCodec::new()),
            3 * 1024 * 1024,
        );

        let doc = json!({"title": "Small", "body": "a".repeat(10 * 1024)});
        let outcome = uploader
            .upload_document("c1", Operation::Checkpoint, &doc)
            .await
            .unwrap();

        assert_eq!(outcome.mode, UploadMode::Direct);
        assert_eq!(transport.kinds(), vec!["direct"]);
        assert_eq!(outcome.response["success"], true);

        match &transport.requests.lock().unwrap()[0] {
            UploadRequest::Direct { encoding, operation, .. } => {
                assert_eq!(*encoding, draftsync_core::ContentEncoding::Gzip);
                assert_eq!(*operation, Operation::Checkpoint);
            }
            other => panic!("unexpected request {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_large_payload_is_chunked_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let mib = 1024 * 1024;
        let uploader = Uploader::new(transport.clone(), Arc::new(IdentityCodec), 3 * mib);

        let outcome = uploader
            .upload_payload("c1", Operation::Publish, payload(7 * mib + mib / 2))
            .await
            .unwrap();

        assert_eq!(outcome.mode, UploadMode::Chunked { chunks: 3 });
        assert_eq!(
            transport.kinds(),
            vec!["init", "chunk", "chunk", "chunk", "complete"]
        );
        assert_eq!(transport.chunk_sizes(), vec![3 * mib, 3 * mib, mib + mib / 2]);
        assert_eq!(outcome.bytes_sent, (7 * mib + mib / 2) as u64);
    }

    #[tokio::test]
    async fn test_payload_at_threshold_is_chunked() {
        let transport = Arc::new(RecordingTransport::default());
        let uploader = Uploader::new(transport.clone(), Arc::new(IdentityCodec), 1024);

        let outcome = uploader
            .upload_payload("c1", Operation::Checkpoint, payload(1024))
            .await
            .unwrap();
        assert_eq!(outcome.mode, UploadMode::Chunked { chunks: 1 });
    }

    #[tokio::test]
    async fn test_chunk_failure_aborts_upload() {
        let transport = Arc::new(RecordingTransport {
            fail_chunk: Some(1),
            ..Default::default()
        });
        let uploader = Uploader::new(transport.clone(), Arc::new(IdentityCodec), 100);

        let err = uploader
            .upload_payload("c1", Operation::Checkpoint, payload(350))
            .await
            .unwrap_err();

        match err {
            ClientError::ChunkFailed { index, total, reason } => {
                assert_eq!(index, 1);
                assert_eq!(total, 4);
                assert!(reason.contains("disk full"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        // No chunk after the failing one, and no complete
        assert_eq!(transport.kinds(), vec!["init", "chunk", "chunk"]);
    }

    #[tokio::test]
    async fn test_explicit_failure_body_is_rejected() {
        struct RejectingTransport;

        #[async_trait]
        impl UploadTransport for RejectingTransport {
            async fn send(&self, _request: UploadRequest) -> Result<Value> {
                Ok(json!({"success": false, "error": "invalid document"}))
            }
        }

        let uploader = Uploader::new(Arc::new(RejectingTransport), Arc::new(IdentityCodec), 1024);
        let err = uploader
            .upload_document("c1", Operation::Checkpoint, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref r) if r == "invalid document"));
    }
}
