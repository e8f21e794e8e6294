use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Draft Store Metrics
    // ============================================================================

    /// Total local draft saves
    pub static ref DRAFT_SAVES_TOTAL: IntCounter = IntCounter::new(
        "draftsync_draft_saves_total",
        "Total local draft saves"
    ).expect("metric can be created");

    // ============================================================================
    // Checkpoint Metrics
    // ============================================================================

    /// Checkpoint passes, by outcome (completed, skipped)
    pub static ref CHECKPOINT_PASSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("draftsync_checkpoint_passes_total", "Total checkpoint passes"),
        &["outcome"]
    ).expect("metric can be created");

    /// Draft uploads, by result (synced, failed)
    pub static ref CHECKPOINT_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("draftsync_checkpoint_uploads_total", "Total draft uploads"),
        &["result"]
    ).expect("metric can be created");

    /// Bytes sent to the upload endpoint, by mode (direct, chunked)
    pub static ref UPLOAD_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("draftsync_upload_bytes_total", "Total bytes uploaded"),
        &["mode"]
    ).expect("metric can be created");

    // ============================================================================
    // Read Cache Metrics
    // ============================================================================

    pub static ref READ_CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "draftsync_read_cache_hits_total",
        "Total read cache hits"
    ).expect("metric can be created");

    pub static ref READ_CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "draftsync_read_cache_misses_total",
        "Total read cache misses"
    ).expect("metric can be created");

    pub static ref READ_CACHE_EVICTIONS_TOTAL: IntCounter = IntCounter::new(
        "draftsync_read_cache_evictions_total",
        "Total read cache LRU evictions"
    ).expect("metric can be created");

    pub static ref READ_CACHE_SIZE_BYTES: IntGauge = IntGauge::new(
        "draftsync_read_cache_size_bytes",
        "Current read cache size in bytes"
    ).expect("metric can be created");

    // ============================================================================
    // Server Metrics
    // ============================================================================

    /// Pointer cache reloads, by result (loaded, stale, failed)
    pub static ref POINTER_CACHE_RELOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("draftsync_pointer_cache_reloads_total", "Total pointer cache reloads"),
        &["result"]
    ).expect("metric can be created");

    /// Pointer writes diverted to the local registry
    pub static ref REGISTRY_FALLBACK_WRITES_TOTAL: IntCounter = IntCounter::new(
        "draftsync_registry_fallback_writes_total",
        "Total pointer writes diverted to the local registry"
    ).expect("metric can be created");

    /// Registry entries drained back into the primary store
    pub static ref REGISTRY_SYNCED_TOTAL: IntCounter = IntCounter::new(
        "draftsync_registry_synced_total",
        "Total registry entries synced to the primary store"
    ).expect("metric can be created");

    /// Chunked upload sessions currently open
    pub static ref UPLOAD_SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "draftsync_upload_sessions_active",
        "Open chunked upload sessions"
    ).expect("metric can be created");

    /// Operations completed by the upload endpoint, by operation
    pub static ref UPLOADS_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("draftsync_uploads_received_total", "Total uploads received"),
        &["operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // Draft store / checkpoint metrics
        REGISTRY
            .register(Box::new(DRAFT_SAVES_TOTAL.clone()))
            .expect("draft_saves_total can be registered");
        REGISTRY
            .register(Box::new(CHECKPOINT_PASSES_TOTAL.clone()))
            .expect("checkpoint_passes_total can be registered");
        REGISTRY
            .register(Box::new(CHECKPOINT_UPLOADS_TOTAL.clone()))
            .expect("checkpoint_uploads_total can be registered");
        REGISTRY
            .register(Box::new(UPLOAD_BYTES_TOTAL.clone()))
            .expect("upload_bytes_total can be registered");

        // Read cache metrics
        REGISTRY
            .register(Box::new(READ_CACHE_HITS_TOTAL.clone()))
            .expect("read_cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(READ_CACHE_MISSES_TOTAL.clone()))
            .expect("read_cache_misses_total can be registered");
        REGISTRY
            .register(Box::new(READ_CACHE_EVICTIONS_TOTAL.clone()))
            .expect("read_cache_evictions_total can be registered");
        REGISTRY
            .register(Box::new(READ_CACHE_SIZE_BYTES.clone()))
            .expect("read_cache_size_bytes can be registered");

        // Server metrics
        REGISTRY
            .register(Box::new(POINTER_CACHE_RELOADS_TOTAL.clone()))
            .expect("pointer_cache_reloads_total can be registered");
        REGISTRY
            .register(Box::new(REGISTRY_FALLBACK_WRITES_TOTAL.clone()))
            .expect("registry_fallback_writes_total can be registered");
        REGISTRY
            .register(Box::new(REGISTRY_SYNCED_TOTAL.clone()))
            .expect("registry_synced_total can be registered");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_ACTIVE.clone()))
            .expect("upload_sessions_active can be registered");
        REGISTRY
            .register(Box::new(UPLOADS_RECEIVED_TOTAL.clone()))
            .expect("uploads_received_total can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
        // If no panic, registration succeeded
    }

    #[test]
    fn test_checkpoint_metrics() {
        CHECKPOINT_UPLOADS_TOTAL.with_label_values(&["synced"]).inc();
        UPLOAD_BYTES_TOTAL.with_label_values(&["direct"]).inc_by(1024);
        assert!(CHECKPOINT_UPLOADS_TOTAL.with_label_values(&["synced"]).get() >= 1);
    }

    #[test]
    fn test_registry_gathers_after_init() {
        init();
        DRAFT_SAVES_TOTAL.inc();
        let families = REGISTRY.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "draftsync_draft_saves_total"));
    }
}
