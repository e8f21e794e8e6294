//! Course read and delete endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use draftsync_core::{content_hash, PointerEntry};
use draftsync_metadata::DeleteOutcome;

use crate::error::{ApiError, Result};
use crate::{models::*, AppState};

pub const VERSION_HEADER: &str = "x-course-version";
pub const HASH_HEADER: &str = "x-content-hash";

/// `GET /api/v1/courses/:id/pointer[?namespace=]`
///
/// Without a namespace the draft pointer is preferred.
pub async fn get_pointer(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<PointerEntry>> {
    state
        .catalog
        .pointer(&course_id, query.namespace)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No pointer for course {}", course_id)))
}

/// `GET /api/v1/courses/:id/document[?namespace=]` (default: published)
pub async fn get_document(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Response> {
    let namespace = query.namespace.unwrap_or_default();
    let (pointer, bytes) = state
        .catalog
        .document(&course_id, namespace)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No {} document for course {}", namespace, course_id))
        })?;

    let hash = pointer.hash.unwrap_or_else(|| content_hash(&bytes));
    let hash = HeaderValue::from_str(&hash)
        .map_err(|e| ApiError::BadRequest(format!("Unusable content hash: {}", e)))?;

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (HeaderName::from_static(VERSION_HEADER), HeaderValue::from(pointer.version)),
            (HeaderName::from_static(HASH_HEADER), hash),
        ],
        bytes,
    )
        .into_response())
}

/// `DELETE /api/v1/courses/:id`
pub async fn delete_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<DeleteOutcome>> {
    Ok(Json(state.catalog.delete_course(&course_id).await?))
}
