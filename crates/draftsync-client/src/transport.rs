//! HTTP Transport
//!
//! The uploader and the read path talk to the server through two small traits so
//! tests can swap in scripted transports:
//!
//! - [`UploadTransport`]: one call per protocol step (direct, init, chunk, complete)
//! - [`CourseSource`]: pointer and document lookups for the read path
//!
//! [`HttpTransport`] implements both over reqwest.
//!
//! ## Wire Format
//!
//! ```text
//! direct    POST /api/v1/upload?courseId=c1&operation=checkpoint
//!           Content-Encoding: gzip, Content-Type: application/gzip
//! init      POST /api/v1/upload?action=init&courseId=c1&totalChunks=3&operation=publish&encoding=gzip
//! chunk     POST /api/v1/upload?action=chunk&uploadId=u&chunkIndex=0   (octet-stream)
//! complete  POST /api/v1/upload?action=complete&uploadId=u
//! ```
//!
//! Every step answers 2xx with a JSON body on success and a non-2xx status with a
//! plain-text body on failure.

use crate::config::SyncConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use draftsync_core::{ContentEncoding, Namespace, Operation, PointerEntry};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

/// One step of the upload protocol
#[derive(Debug, Clone)]
pub enum UploadRequest {
    Direct {
        document_id: String,
        operation: Operation,
        encoding: ContentEncoding,
        body: Bytes,
    },
    Init {
        document_id: String,
        total_chunks: usize,
        operation: Operation,
        encoding: ContentEncoding,
    },
    Chunk {
        upload_id: String,
        index: usize,
        body: Bytes,
    },
    Complete {
        upload_id: String,
    },
}

impl UploadRequest {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadRequest::Direct { .. } => "direct",
            UploadRequest::Init { .. } => "init",
            UploadRequest::Chunk { .. } => "chunk",
            UploadRequest::Complete { .. } => "complete",
        }
    }
}

/// Sends upload protocol steps to the server.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Send one step and return the server's JSON response body
    async fn send(&self, request: UploadRequest) -> Result<Value>;
}

/// A document as served by the read endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    pub version: u64,
    pub hash: String,
    pub document: Value,
}

/// Server-side lookups used by the read path.
#[async_trait]
pub trait CourseSource: Send + Sync {
    /// Current pointer for a course, `None` if the server has none
    async fn fetch_pointer(
        &self,
        course_id: &str,
        namespace: Option<Namespace>,
    ) -> Result<Option<PointerEntry>>;

    /// Current document for a course, `None` if the server has none
    async fn fetch_document(
        &self,
        course_id: &str,
        namespace: Namespace,
    ) -> Result<Option<FetchedDocument>>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    config: SyncConfig,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build(&self, request: UploadRequest) -> reqwest::RequestBuilder {
        let url = self.config.upload_url();
        match request {
            UploadRequest::Direct {
                document_id,
                operation,
                encoding,
                body,
            } => self
                .http_client
                .post(&url)
                .query(&[
                    ("courseId", document_id.as_str()),
                    ("operation", operation.as_str()),
                ])
                .header(CONTENT_ENCODING, encoding.as_str())
                .header(CONTENT_TYPE, encoding.content_type())
                .body(body),
            UploadRequest::Init {
                document_id,
                total_chunks,
                operation,
                encoding,
            } => self.http_client.post(&url).query(&[
                ("action", "init"),
                ("courseId", document_id.as_str()),
                ("totalChunks", total_chunks.to_string().as_str()),
                ("operation", operation.as_str()),
                ("encoding", encoding.as_str()),
            ]),
            UploadRequest::Chunk {
                upload_id,
                index,
                body,
            } => self
                .http_client
                .post(&url)
                .query(&[
                    ("action", "chunk"),
                    ("uploadId", upload_id.as_str()),
                    ("chunkIndex", index.to_string().as_str()),
                ])
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body),
            UploadRequest::Complete { upload_id } => self
                .http_client
                .post(&url)
                .query(&[("action", "complete"), ("uploadId", upload_id.as_str())]),
        }
    }

    async fn get_optional(
        &self,
        url: &str,
        namespace: Option<Namespace>,
    ) -> Result<Option<reqwest::Response>> {
        let mut request = self.http_client.get(url);
        if let Some(namespace) = namespace {
            request = request.query(&[("namespace", namespace.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response).await.map(Some)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http { status, body })
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(&self, request: UploadRequest) -> Result<Value> {
        let kind = request.kind();
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("{} request failed: {}", kind, e)))?;

        let response = check_status(response).await?;
        response.json::<Value>().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse {} response: {}", kind, e))
        })
    }
}

#[async_trait]
impl CourseSource for HttpTransport {
    async fn fetch_pointer(
        &self,
        course_id: &str,
        namespace: Option<Namespace>,
    ) -> Result<Option<PointerEntry>> {
        let url = self.config.course_url(course_id, "pointer");
        let Some(response) = self.get_optional(&url, namespace).await? else {
            return Ok(None);
        };

        let pointer = response.json::<PointerEntry>().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse pointer: {}", e))
        })?;
        Ok(Some(pointer))
    }

    async fn fetch_document(
        &self,
        course_id: &str,
        namespace: Namespace,
    ) -> Result<Option<FetchedDocument>> {
        let url = self.config.course_url(course_id, "document");
        let Some(response) = self.get_optional(&url, Some(namespace)).await? else {
            return Ok(None);
        };

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let version = header("x-course-version")
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ClientError::InvalidResponse("missing x-course-version".to_string()))?;
        let hash = header("x-content-hash")
            .ok_or_else(|| ClientError::InvalidResponse("missing x-content-hash".to_string()))?;

        let document = response.json::<Value>().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse document: {}", e))
        })?;

        Ok(Some(FetchedDocument {
            version,
            hash,
            document,
        }))
    }
}
