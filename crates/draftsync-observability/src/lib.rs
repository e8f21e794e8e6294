//! DraftSync Observability
//!
//! Prometheus metrics shared by every DraftSync crate, plus a router that exposes
//! them at `/metrics`.
//!
//! # Usage
//!
//! ```no_run
//! use draftsync_observability::{exporter, metrics};
//!
//! // Register all metrics with the global registry (idempotent)
//! metrics::init();
//!
//! // Mount next to the API routes
//! let metrics_router: axum::Router = exporter::create_metrics_router();
//! ```
//!
//! Structured logging is done with `tracing` in each crate; the hosting binary
//! installs the subscriber.

pub mod exporter;
pub mod metrics;

pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init();
    }

    #[test]
    fn test_double_init_is_safe() {
        init();
        init_metrics();
        let _registry = &*REGISTRY;
    }
}
