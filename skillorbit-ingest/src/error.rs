//! Error types for skillorbit-ingest
//!
//! `IngestionError` is fatal to a catalog refresh: the store is left exactly
//! as it was. Row-level problems are not errors; they come back as warnings
//! in `IngestResult`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Fatal catalog refresh failure
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The workbook bytes cannot be opened or a sheet cannot be decoded
    #[error("Cannot read workbook: {0}")]
    SourceRead(String),

    /// A sheet the refresh depends on is not in the workbook
    #[error("Workbook has no '{0}' sheet")]
    SheetMissing(String),

    /// Any delete/insert/commit failure; the transaction was rolled back
    #[error("Store transaction failed: {0}")]
    StoreTransaction(#[from] sqlx::Error),

    /// The deletes and inserts did not finish within the configured bound
    #[error("Store transaction timed out after {0:?}")]
    StoreTimeout(Duration),

    /// The caller cancelled the refresh before commit
    #[error("Catalog refresh cancelled before commit")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for IngestionError {
    fn from(err: std::io::Error) -> Self {
        IngestionError::SourceRead(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Catalog refresh failed (500)
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Ingestion(IngestionError::Internal(msg)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Ingestion(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INGESTION_FAILED",
                format!("An internal error occurred: {}", err),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
