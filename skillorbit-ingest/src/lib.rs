//! skillorbit-ingest library interface
//!
//! The catalog ingestion pipeline plus the HTTP upload boundary that
//! drives it. Exposed as a library for integration testing.

pub mod api;
pub mod error;
pub mod ingest;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, IngestionError};
pub use crate::ingest::{IngestOptions, IngestResult, Ingestor};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Catalog refresher; every handler clone shares its single-flight guard
    pub ingestor: Ingestor,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Browser origins allowed to call the service with credentials
    pub cors_allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(db: SqlitePool, ingestor: Ingestor, max_upload_bytes: usize) -> Self {
        Self {
            db,
            ingestor,
            max_upload_bytes,
            cors_allowed_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    let cors = cors_layer(&state.cors_allowed_origins);

    Router::new()
        .merge(api::upload_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Credentialed CORS for an explicit origin list; unparsable origins are
/// skipped with a warning
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
