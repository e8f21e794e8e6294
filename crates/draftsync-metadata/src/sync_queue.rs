//! Registry Sync Queue
//!
//! Drains the local registry into the primary record store once quota is back.
//!
//! ## One Drain
//!
//! ```text
//! for entry in registry.pending()          (oldest first)
//!     records.set(collection, id, pointer, merge = true)
//!         Ok            → mark_as_synced (unless re-parked meanwhile), synced += 1
//!         quota error   → stop the drain, the rest waits for the next one
//!         other error   → failed += 1, keep going
//! if synced > 0 → invalidate the pointer cache (once)
//! ```
//!
//! Stopping at the first quota error keeps a drain from burning through every
//! pending entry against a store that is still refusing writes.
//!
//! [`SyncQueueTask`] runs a drain on a fixed period. Drains can also be triggered
//! on demand through [`SyncQueue::sync_pending_courses`].

use crate::error::Result;
use crate::pointer_cache::PointerCache;
use crate::record::{collection_for, RecordStore};
use crate::registry::LocalRegistry;
use draftsync_observability::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueReport {
    pub synced: usize,
    pub failed: usize,
    /// The drain stopped early on a quota error
    pub quota_exhausted: bool,
}

pub struct SyncQueue {
    registry: Arc<LocalRegistry>,
    records: Arc<dyn RecordStore>,
    pointers: Arc<PointerCache>,
    /// One drain at a time; a second caller waits and then drains what is left
    drain_lock: Mutex<()>,
}

impl SyncQueue {
    pub fn new(
        registry: Arc<LocalRegistry>,
        records: Arc<dyn RecordStore>,
        pointers: Arc<PointerCache>,
    ) -> Self {
        Self {
            registry,
            records,
            pointers,
            drain_lock: Mutex::new(()),
        }
    }

    /// Number of registry entries still waiting for the primary store
    pub async fn pending_count(&self) -> usize {
        self.registry.pending().await.len()
    }

    /// Push every pending registry entry to the primary store.
    pub async fn sync_pending_courses(&self) -> Result<SyncQueueReport> {
        let _guard = self.drain_lock.lock().await;

        let pending = self.registry.pending().await;
        if pending.is_empty() {
            debug!("Registry sync queue empty");
            return Ok(SyncQueueReport::default());
        }

        let mut report = SyncQueueReport::default();
        for entry in &pending {
            let pointer = serde_json::to_value(entry.to_pointer())?;
            let collection = collection_for(entry.namespace);

            match self
                .records
                .set(collection, &entry.document_id, pointer, true)
                .await
            {
                Ok(()) => {
                    self.registry.mark_as_synced_if_unchanged(entry).await?;
                    metrics::REGISTRY_SYNCED_TOTAL.inc();
                    report.synced += 1;
                }
                Err(e) if e.is_quota_exhausted() => {
                    warn!(
                        course_id = %entry.document_id,
                        remaining = pending.len() - report.synced - report.failed,
                        "Record store still over quota, stopping registry drain"
                    );
                    report.quota_exhausted = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        course_id = %entry.document_id,
                        namespace = %entry.namespace,
                        error = %e,
                        "Failed to sync registry entry"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.synced > 0 {
            self.pointers.invalidate().await;
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            quota_exhausted = report.quota_exhausted,
            "Registry drain completed"
        );
        Ok(report)
    }
}

/// Periodic registry drain.
pub struct SyncQueueTask {
    queue: Arc<SyncQueue>,
    interval: Duration,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl SyncQueueTask {
    pub fn new(queue: Arc<SyncQueue>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            handle: RwLock::new(None),
        }
    }

    /// Start draining every `interval`. The first drain happens one interval in.
    pub async fn start(&self) {
        let mut handle = self.handle.write().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            info!("Registry sync queue already running");
            return;
        }

        let queue = Arc::clone(&self.queue);
        // tokio::time::interval panics on a zero period
        let interval = self.interval.max(Duration::from_millis(1));
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = queue.sync_pending_courses().await {
                    warn!(error = %e, "Registry drain failed");
                }
            }
        }));

        info!(
            interval_seconds = self.interval.as_secs(),
            "Registry sync queue started"
        );
    }

    pub async fn stop(&self) {
        if let Some(task) = self.handle.write().await.take() {
            task.abort();
            let _ = task.await;
            info!("Registry sync queue stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
