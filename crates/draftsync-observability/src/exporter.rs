//! Metrics Exporter
//!
//! Serves the DraftSync registry in the Prometheus text format:
//!
//! ```text
//! GET /metrics
//!     draftsync_draft_saves_total 12
//!     draftsync_checkpoint_uploads_total{result="synced"} 9
//!     draftsync_registry_fallback_writes_total 1
//!     draftsync_upload_sessions_active 0
//!     ...
//! ```
//!
//! The handler registers the metrics itself, so a router mounted without an explicit
//! `init()` still exposes every family.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::{self, REGISTRY};

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    metrics::init();

    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut body = Vec::with_capacity(4096);
    if let Err(e) = encoder.encode(&families, &mut body) {
        tracing::error!(error = %e, families = families.len(), "Metrics encoding failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        [
            (header::CONTENT_TYPE, encoder.format_type().to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        body,
    )
        .into_response()
}

/// Router exposing `/metrics`, merged into the API router by the server
pub fn create_metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}
