//! Local Draft Store
//!
//! Persists the full editable state of every course the author touches so that
//! nothing is lost if the browser tab, the network, or the server goes away. Each
//! save replaces the previous entry for that document and flags it dirty; the
//! checkpoint loop later uploads dirty entries and flips them back to clean.
//!
//! ## Dirty Tracking
//!
//! ```text
//! save_draft_local      → dirty = true,  lastModified = max(now, syncedAt + 1)
//! mark_draft_synced     → dirty = false, syncedAt     = max(now, lastModified)
//! ```
//!
//! Timestamps are kept strictly ordered so `dirty` always agrees with
//! `lastModified > syncedAt`, even when a save and a sync land in the same
//! millisecond.
//!
//! ## Edits During an Upload
//!
//! The checkpoint loop snapshots an entry, uploads it, then calls
//! [`DraftStore::mark_draft_synced_if_unmodified`] with the snapshot's
//! `lastModified`. If the author saved again in the meantime the entry stays dirty
//! and is picked up by the next pass.

use crate::error::Result;
use crate::local_store::LocalStore;
use bytes::Bytes;
use draftsync_core::{now_ms, DraftEntry};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keyed store of local drafts.
pub struct DraftStore {
    store: Arc<dyn LocalStore>,
    /// Serializes read-modify-write cycles on entries
    write_lock: Mutex<()>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Save the current state of a document locally and mark it dirty.
    ///
    /// Last write wins. Fails only if local persistence is unavailable.
    pub async fn save_draft_local(&self, document_id: &str, document: Value) -> Result<DraftEntry> {
        let _guard = self.write_lock.lock().await;

        // The new entry replaces the old one; an undecodable old entry only loses its syncedAt
        let synced_at = match self.read_entry(document_id).await {
            Ok(previous) => previous.and_then(|e| e.synced_at),
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    course_id = %document_id,
                    error = %e,
                    "Replacing unreadable draft entry"
                );
                None
            }
        };

        let mut last_modified = now_ms();
        if let Some(synced_at) = synced_at {
            last_modified = last_modified.max(synced_at + 1);
        }

        let entry = DraftEntry {
            document_id: document_id.to_string(),
            document,
            last_modified,
            synced_at,
            dirty: true,
        };
        self.write_entry(&entry).await?;

        draftsync_observability::metrics::DRAFT_SAVES_TOTAL.inc();
        tracing::debug!(course_id = %document_id, last_modified, "Saved draft locally");

        Ok(entry)
    }

    /// Current local document, if any. Does not change dirty state.
    pub async fn get_draft_local(&self, document_id: &str) -> Result<Option<Value>> {
        Ok(self.read_entry(document_id).await?.map(|e| e.document))
    }

    /// Full local entry including timestamps
    pub async fn get_draft_entry(&self, document_id: &str) -> Result<Option<DraftEntry>> {
        self.read_entry(document_id).await
    }

    pub async fn has_dirty_draft(&self, document_id: &str) -> Result<bool> {
        Ok(self
            .read_entry(document_id)
            .await?
            .map(|e| e.dirty)
            .unwrap_or(false))
    }

    /// Mark a draft as uploaded. No-op if there is no entry.
    pub async fn mark_draft_synced(&self, document_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(mut entry) = self.read_entry(document_id).await? else {
            tracing::debug!(course_id = %document_id, "No draft to mark synced");
            return Ok(());
        };

        entry.synced_at = Some(now_ms().max(entry.last_modified));
        entry.dirty = false;
        self.write_entry(&entry).await
    }

    /// Mark a draft as uploaded only if it has not been edited since the snapshot
    /// taken at `last_modified`.
    ///
    /// Returns `true` if the entry is now clean. When the entry changed in the
    /// meantime, `syncedAt` records the uploaded snapshot and the entry stays dirty.
    pub async fn mark_draft_synced_if_unmodified(
        &self,
        document_id: &str,
        last_modified: i64,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut entry) = self.read_entry(document_id).await? else {
            return Ok(false);
        };

        if entry.last_modified == last_modified {
            entry.synced_at = Some(now_ms().max(entry.last_modified));
            entry.dirty = false;
            self.write_entry(&entry).await?;
            return Ok(true);
        }

        tracing::debug!(
            course_id = %document_id,
            uploaded = last_modified,
            current = entry.last_modified,
            "Draft changed during upload, leaving dirty"
        );
        entry.synced_at = Some(last_modified);
        entry.dirty = true;
        self.write_entry(&entry).await?;
        Ok(false)
    }

    /// Every dirty draft, oldest edit first.
    ///
    /// Entries that cannot be decoded are logged and skipped.
    pub async fn get_all_dirty_drafts(&self) -> Result<Vec<DraftEntry>> {
        let mut dirty: Vec<DraftEntry> = self
            .list_drafts()
            .await?
            .into_iter()
            .filter(|e| e.dirty)
            .collect();
        dirty.sort_by_key(|e| e.last_modified);
        Ok(dirty)
    }

    /// Every local draft, dirty or not
    pub async fn list_drafts(&self) -> Result<Vec<DraftEntry>> {
        let mut entries = Vec::new();
        for key in self.store.keys().await? {
            match self.read_entry(&key).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(course_id = %key, error = %e, "Skipping unreadable draft");
                }
            }
        }
        Ok(entries)
    }

    /// Hard-delete the local draft.
    pub async fn clear_draft_local(&self, document_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(document_id).await?;
        tracing::debug!(course_id = %document_id, "Cleared local draft");
        Ok(())
    }

    async fn read_entry(&self, document_id: &str) -> Result<Option<DraftEntry>> {
        match self.store.get(document_id).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_entry(&self, entry: &DraftEntry) -> Result<()> {
        let raw = serde_json::to_vec(entry)?;
        self.store.put(&entry.document_id, Bytes::from(raw)).await
    }
}
