//! Workbook upload handler
//!
//! POST /upload-and-refresh takes a multipart form with one `file` field,
//! checks the filename, and runs a full catalog refresh on the bytes.

use std::io::Cursor;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// Multipart field carrying the workbook
pub const FILE_FIELD: &str = "file";

const WORKBOOK_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// POST /upload-and-refresh response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub trainers_loaded: usize,
    pub trainings_loaded: usize,
    pub warnings: Vec<String>,
}

/// An uploaded file, fully buffered
#[derive(Debug)]
struct Upload {
    filename: String,
    bytes: Bytes,
}

/// POST /upload-and-refresh
///
/// 400 for a missing file or a non-workbook filename, 500 when the refresh
/// itself fails (store unchanged in that case).
pub async fn upload_and_refresh(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let upload = read_upload(multipart).await?;
    tracing::info!(
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Received workbook for catalog refresh"
    );

    if !is_workbook_filename(&upload.filename) {
        return Err(ApiError::BadRequest(
            "Invalid file type. Please upload an Excel file.".to_string(),
        ));
    }

    let result = state
        .ingestor
        .ingest(Cursor::new(upload.bytes), &state.db)
        .await
        .map_err(|e| {
            tracing::error!(filename = %upload.filename, error = %e, "Catalog refresh failed");
            e
        })?;

    tracing::info!(
        filename = %upload.filename,
        trainers_loaded = result.trainers_loaded,
        trainings_loaded = result.trainings_loaded,
        "Catalog refreshed from upload"
    );

    Ok(Json(UploadResponse {
        message: format!(
            "Data from '{}' has been successfully uploaded and the database has been refreshed.",
            upload.filename
        ),
        trainers_loaded: result.trainers_loaded,
        trainings_loaded: result.trainings_loaded,
        warnings: result.warnings,
    }))
}

/// First `file` field of the form; other fields are ignored
async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e.body_text())))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| {
                ApiError::BadRequest(format!("Failed to read upload: {}", e.body_text()))
            })?;

        return Ok(Upload { filename, bytes });
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// Case-insensitive `.xlsx` / `.xls` suffix check
pub fn is_workbook_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    WORKBOOK_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload-and-refresh", post(upload_and_refresh))
}
