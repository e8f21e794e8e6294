//! Health endpoint

use axum::{extract::State, Json};

use crate::{models::HealthResponse, AppState};

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        pending_sync: state.catalog.sync_queue().pending_count().await,
        upload_sessions: state.sessions.len().await,
    })
}
