//! Fallback registry and pointer cache endpoints

use axum::{extract::State, Json};
use draftsync_core::RegistryEntry;
use draftsync_metadata::SyncQueueReport;

use crate::error::Result;
use crate::{models::*, AppState};

/// `GET /api/v1/registry`
pub async fn list_registry(State(state): State<AppState>) -> Json<Vec<RegistryEntry>> {
    Json(state.catalog.registry().list().await)
}

/// `POST /api/v1/registry/sync`
pub async fn sync_registry(State(state): State<AppState>) -> Result<Json<SyncQueueReport>> {
    Ok(Json(state.catalog.sync_pending().await?))
}

/// `POST /api/v1/pointers/invalidate`
pub async fn invalidate_pointers(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.catalog.pointers().invalidate().await;
    Json(SuccessResponse { success: true })
}
