//! API models for REST endpoints

use draftsync_core::{Namespace, Operation};
use draftsync_metadata::SaveOutcome;
use serde::{Deserialize, Serialize};

/// Query string of `POST /api/v1/upload`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    /// `init`, `chunk` or `complete`; absent for a direct upload
    pub action: Option<String>,
    pub course_id: Option<String>,
    pub operation: Option<Operation>,
    pub total_chunks: Option<usize>,
    pub encoding: Option<String>,
    pub upload_id: Option<String>,
    pub chunk_index: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<Namespace>,
}

/// Body returned once a document has been saved
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: SaveOutcome,
}

impl From<SaveOutcome> for UploadResponse {
    fn from(outcome: SaveOutcome) -> Self {
        Self {
            success: true,
            outcome,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub success: bool,
    pub upload_id: String,
    pub total_chunks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub chunk_index: usize,
    pub received: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub pending_sync: usize,
    pub upload_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
