//! Common error types for SkillOrbit

use thiserror::Error;

/// Common result type for SkillOrbit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or opening the shared database
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
