//! DraftSync REST API Server
//!
//! Receives checkpoint and publish uploads from the course editor and serves
//! course pointers and documents back to its read path.
//!
//! ## Routes
//!
//! ```text
//! POST   /api/v1/upload                      direct / init / chunk / complete
//! GET    /api/v1/courses/:id/pointer         current pointer (draft preferred)
//! GET    /api/v1/courses/:id/document        document + x-course-version / x-content-hash
//! DELETE /api/v1/courses/:id                 blobs, records, registry entries
//! GET    /api/v1/registry                    fallback registry contents
//! POST   /api/v1/registry/sync               drain the registry now
//! POST   /api/v1/pointers/invalidate         drop the pointer cache
//! GET    /health
//! GET    /metrics
//! ```
//!
//! Request bodies are capped at the platform request ceiling (4.5 MiB); larger
//! documents arrive through the chunked protocol.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use draftsync_core::REQUEST_SIZE_CEILING;
use draftsync_metadata::CourseCatalog;
use draftsync_observability::exporter;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod sessions;

pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use sessions::UploadSessions;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CourseCatalog>,
    pub sessions: Arc<UploadSessions>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    draftsync_observability::init();

    let api_routes = Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route("/courses/:id", delete(handlers::courses::delete_course))
        .route("/courses/:id/pointer", get(handlers::courses::get_pointer))
        .route("/courses/:id/document", get(handlers::courses::get_document))
        .route("/registry", get(handlers::registry::list_registry))
        .route("/registry/sync", post(handlers::registry::sync_registry))
        .route(
            "/pointers/invalidate",
            post(handlers::registry::invalidate_pointers),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health::health_check))
        .merge(exporter::create_metrics_router())
        .layer(DefaultBodyLimit::max(REQUEST_SIZE_CEILING))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `router` on `0.0.0.0:port` until ctrl-c.
pub async fn serve(
    router: Router,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "DraftSync API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
