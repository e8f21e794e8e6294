//! Upload endpoint
//!
//! One route, four protocol steps selected by `?action=`:
//!
//! ```text
//! (none)    direct upload, body = whole payload   → save, UploadResponse
//! init      open a chunk session                  → InitUploadResponse
//! chunk     store one chunk                       → ChunkResponse
//! complete  assemble, decode and save             → UploadResponse
//! ```
//!
//! Payloads are gzip when the encoding says so or when the body carries the gzip
//! magic number; anything else is taken as raw JSON. Either way the decoded
//! document may not exceed `MAX_DOCUMENT_SIZE` (413 otherwise).

use axum::{
    extract::{Query, State},
    http::{header::CONTENT_ENCODING, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use draftsync_core::{
    decompress_payload_limited, is_gzip, ContentEncoding, Operation, MAX_DOCUMENT_SIZE,
};
use draftsync_observability::metrics;

use crate::error::{ApiError, Result};
use crate::{models::*, AppState};

/// `POST /api/v1/upload`
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    match query.action.as_deref() {
        None => direct(&state, &query, &headers, body).await,
        Some("init") => init(&state, &query).await,
        Some("chunk") => chunk(&state, &query, body).await,
        Some("complete") => complete(&state, &query).await,
        Some(other) => Err(ApiError::BadRequest(format!("Unknown action: {}", other))),
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {}", name)))
}

/// Undo the client's codec step
fn decode_payload(body: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>> {
    let compressed = encoding.is_compressed() || is_gzip(body);
    Ok(decompress_payload_limited(body, compressed, MAX_DOCUMENT_SIZE)?)
}

async fn save(
    state: &AppState,
    course_id: &str,
    operation: Operation,
    payload: &[u8],
) -> Result<Response> {
    let outcome = state
        .catalog
        .save_document(course_id, operation, payload)
        .await?;
    metrics::UPLOADS_RECEIVED_TOTAL
        .with_label_values(&[operation.as_str()])
        .inc();
    Ok(Json(UploadResponse::from(outcome)).into_response())
}

async fn direct(
    state: &AppState,
    query: &UploadQuery,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let course_id = required(&query.course_id, "courseId")?;
    let operation = query.operation.unwrap_or_default();
    let encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(ContentEncoding::parse)
        .unwrap_or(ContentEncoding::Identity);

    let payload = decode_payload(&body, encoding)?;
    tracing::debug!(
        course_id,
        operation = %operation,
        wire_bytes = body.len(),
        payload_bytes = payload.len(),
        "Direct upload received"
    );
    save(state, course_id, operation, &payload).await
}

async fn init(state: &AppState, query: &UploadQuery) -> Result<Response> {
    let course_id = required(&query.course_id, "courseId")?;
    let total_chunks = query
        .total_chunks
        .ok_or_else(|| ApiError::BadRequest("Missing totalChunks".to_string()))?;
    let operation = query.operation.unwrap_or_default();
    let encoding = query
        .encoding
        .as_deref()
        .map(ContentEncoding::parse)
        .unwrap_or(ContentEncoding::Identity);

    let upload_id = state
        .sessions
        .open(course_id, total_chunks, operation, encoding)
        .await?;

    Ok(Json(InitUploadResponse {
        success: true,
        upload_id,
        total_chunks,
    })
    .into_response())
}

async fn chunk(state: &AppState, query: &UploadQuery, body: Bytes) -> Result<Response> {
    let upload_id = required(&query.upload_id, "uploadId")?;
    let chunk_index = query
        .chunk_index
        .ok_or_else(|| ApiError::BadRequest("Missing chunkIndex".to_string()))?;

    let (received, total_chunks) = state.sessions.add_chunk(upload_id, chunk_index, body).await?;

    Ok(Json(ChunkResponse {
        success: true,
        chunk_index,
        received,
        total_chunks,
    })
    .into_response())
}

async fn complete(state: &AppState, query: &UploadQuery) -> Result<Response> {
    let upload_id = required(&query.upload_id, "uploadId")?;
    let session = state.sessions.finish(upload_id).await?;

    let assembled = session.assembler.assemble()?;
    let payload = decode_payload(&assembled, session.encoding)?;
    tracing::info!(
        upload_id,
        course_id = %session.course_id,
        chunks = session.assembler.total(),
        wire_bytes = assembled.len(),
        payload_bytes = payload.len(),
        "Chunked upload assembled"
    );

    save(state, &session.course_id, session.operation, &payload).await
}
