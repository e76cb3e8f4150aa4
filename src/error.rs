/// Unified error types for the media engine
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for media storage and ingestion
#[derive(Error, Debug)]
pub enum MediaError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upload bytes whose signature is not a supported image format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Ingest target folder does not exist
    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    /// Storage backend I/O failures (disk or object store)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Malformed parameters (resize, quality, paging, keys)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Read of a missing or deleted record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness conflicts (concurrent ingest of identical content)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert MediaError to HTTP response
impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            MediaError::UnsupportedFormat(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UnsupportedFormat",
                self.to_string(),
            ),
            MediaError::FolderNotFound(_) => (
                StatusCode::BAD_REQUEST,
                "FolderNotFound",
                self.to_string(),
            ),
            MediaError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            MediaError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            MediaError::Conflict(_) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            MediaError::Backend(_)
            | MediaError::Database(_)
            | MediaError::Internal(_)
            | MediaError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;
