//! Checkpoint Sync Loop
//!
//! Background task that periodically flushes dirty local drafts to the server.
//!
//! ## How It Works
//!
//! 1. On `start()`, run one pass immediately, then one every `interval` (default 30s)
//! 2. Each pass reads every dirty draft and uploads them one after another
//! 3. A successful upload marks the draft synced (unless it was edited meanwhile)
//! 4. A failed upload is logged and the draft stays dirty for the next pass
//!
//! There is no retry or backoff inside a pass. Drafts are replace-on-write, so
//! re-sending one on the next tick is always safe.
//!
//! ## No Overlap
//!
//! At most one pass is in flight. A pass that starts while another is running
//! returns an empty summary immediately instead of queueing. `force_sync_course`
//! does not take the pass guard; racing a pass on the same course costs at most
//! one redundant upload.
//!
//! ## Example
//!
//! ```ignore
//! let sync = CheckpointSync::new(drafts, uploader, Duration::from_secs(30));
//! sync.start().await;
//!
//! // "Sync now" button
//! sync.force_sync_course("course-42").await?;
//!
//! sync.stop().await;
//! ```

use crate::error::{ClientError, Result};
use crate::upload::Uploader;
use draftsync_core::{DraftEntry, Operation};
use draftsync_observability::metrics;
use draftsync_storage::DraftStore;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one checkpoint pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
}

/// Clears the in-flight flag when a pass ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct SyncWorker {
    drafts: Arc<DraftStore>,
    uploader: Uploader,
    in_flight: AtomicBool,
}

impl SyncWorker {
    async fn run_checkpoint(&self) -> SyncSummary {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("Checkpoint already in flight, skipping");
            metrics::CHECKPOINT_PASSES_TOTAL
                .with_label_values(&["skipped"])
                .inc();
            return SyncSummary::default();
        };

        let dirty = match self.drafts.get_all_dirty_drafts().await {
            Ok(dirty) => dirty,
            Err(e) => {
                warn!(error = %e, "Failed to read dirty drafts, skipping checkpoint");
                metrics::CHECKPOINT_PASSES_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return SyncSummary::default();
            }
        };

        let mut summary = SyncSummary::default();
        for entry in &dirty {
            match self.sync_entry(entry, Operation::Checkpoint).await {
                Ok(_) => summary.synced += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        course_id = %entry.document_id,
                        error = %e,
                        "Checkpoint upload failed, will retry next tick"
                    );
                }
            }
        }

        metrics::CHECKPOINT_PASSES_TOTAL
            .with_label_values(&["completed"])
            .inc();
        if !dirty.is_empty() {
            info!(
                synced = summary.synced,
                failed = summary.failed,
                "Checkpoint pass completed"
            );
        }

        summary
    }

    /// Upload one draft snapshot and mark it synced if nothing changed since.
    async fn sync_entry(&self, entry: &DraftEntry, operation: Operation) -> Result<Value> {
        let outcome = match self
            .uploader
            .upload_document(&entry.document_id, operation, &entry.document)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::CHECKPOINT_UPLOADS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return Err(e);
            }
        };

        metrics::CHECKPOINT_UPLOADS_TOTAL
            .with_label_values(&["synced"])
            .inc();

        let clean = self
            .drafts
            .mark_draft_synced_if_unmodified(&entry.document_id, entry.last_modified)
            .await?;

        debug!(
            course_id = %entry.document_id,
            mode = outcome.mode.as_str(),
            bytes = outcome.bytes_sent,
            clean,
            "Draft uploaded"
        );

        Ok(outcome.response)
    }
}

/// Periodic flush of dirty drafts.
pub struct CheckpointSync {
    worker: Arc<SyncWorker>,
    interval: Duration,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl CheckpointSync {
    pub fn new(drafts: Arc<DraftStore>, uploader: Uploader, interval: Duration) -> Self {
        Self {
            worker: Arc::new(SyncWorker {
                drafts,
                uploader,
                in_flight: AtomicBool::new(false),
            }),
            interval,
            handle: RwLock::new(None),
        }
    }

    /// Start the periodic loop. Runs a pass immediately.
    ///
    /// Calling `start()` while already running logs and does nothing.
    pub async fn start(&self) {
        let mut handle = self.handle.write().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            info!("Checkpoint sync already running");
            return;
        }

        let worker = Arc::clone(&self.worker);
        let interval = self.interval;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // First tick completes immediately
                ticker.tick().await;
                worker.run_checkpoint().await;
            }
        }));

        info!(
            interval_seconds = self.interval.as_secs(),
            "Checkpoint sync started"
        );
    }

    /// Stop the periodic loop. A pass in progress is cancelled at its next await.
    pub async fn stop(&self) {
        let mut handle = self.handle.write().await;
        match handle.take() {
            Some(task) => {
                task.abort();
                let _ = task.await;
                info!("Checkpoint sync stopped");
            }
            None => info!("Checkpoint sync not running, skipping stop"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one pass now. Returns `{0, 0}` if another pass is in flight.
    pub async fn run_checkpoint(&self) -> SyncSummary {
        self.worker.run_checkpoint().await
    }

    /// Upload one course right away, outside the periodic schedule.
    ///
    /// Returns `false` if there is no dirty draft for the course. Upload errors are
    /// returned to the caller.
    pub async fn force_sync_course(&self, course_id: &str) -> Result<bool> {
        let Some(entry) = self.worker.drafts.get_draft_entry(course_id).await? else {
            return Ok(false);
        };
        if !entry.dirty {
            return Ok(false);
        }

        self.worker.sync_entry(&entry, Operation::Checkpoint).await?;
        info!(course_id = %course_id, "Forced sync completed");
        Ok(true)
    }

    /// Publish the current local draft of a course, dirty or not.
    ///
    /// Returns the server's result payload.
    pub async fn publish_course(&self, course_id: &str) -> Result<Value> {
        let entry = self
            .worker
            .drafts
            .get_draft_entry(course_id)
            .await?
            .ok_or_else(|| ClientError::DraftNotFound(course_id.to_string()))?;

        let response = self.worker.sync_entry(&entry, Operation::Publish).await?;
        info!(course_id = %course_id, "Course published");
        Ok(response)
    }
}
