//! API Error Types
//!
//! Every handler returns `Result<_, ApiError>`. Errors leave the server as a status
//! code with a plain-text body, which is what the upload client reports back to
//! the editor.
//!
//! | Error                                   | Status |
//! |-----------------------------------------|--------|
//! | `BadRequest`, invalid document, codec   | 400    |
//! | `NotFound`, missing blob                | 404    |
//! | decoded payload over the size cap       | 413    |
//! | quota exhausted, `Busy`                 | 503    |
//! | anything else                           | 500    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use draftsync_metadata::MetadataError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Upload capacity exhausted; retry later
    #[error("{0}")]
    Busy(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Invalid payload: {0}")]
    Payload(#[from] draftsync_core::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::PayloadTooLarge(_)
            | ApiError::Payload(draftsync_core::Error::PayloadTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::BadRequest(_) | ApiError::Payload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Metadata(e) if e.is_quota_exhausted() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Metadata(MetadataError::InvalidDocument(_))
            | ApiError::Metadata(MetadataError::InvalidReference(_)) => StatusCode::BAD_REQUEST,
            ApiError::Metadata(MetadataError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(draftsync_core::Error::PayloadTooLarge { limit: 1 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Busy("full".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(MetadataError::InvalidDocument("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(MetadataError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(MetadataError::Backend("RESOURCE_EXHAUSTED".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(MetadataError::Backend("disk on fire".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(draftsync_core::Error::ChunkMissing { index: 1, total: 3 }).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
