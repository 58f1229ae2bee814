//! Database initialization
//!
//! Opens (or creates) the shared SQLite database and creates the catalog
//! tables if they are missing. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys, WAL and busy timeout are per-connection settings, so
    // they go on the connect options rather than a one-off PRAGMA.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every table the catalog refresh touches (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_trainers_table(pool).await?;
    create_training_details_table(pool).await?;
    create_training_assignments_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            hashed_password TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_trainers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trainers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            skill TEXT,
            competency TEXT NOT NULL,
            trainer_name TEXT,
            expertise_level TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_training_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_details (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            division TEXT,
            department TEXT,
            competency TEXT,
            skill TEXT,
            training_name TEXT NOT NULL,
            training_topics TEXT,
            prerequisites TEXT,
            skill_category TEXT,
            trainer_name TEXT,
            email TEXT,
            training_date DATE,
            duration TEXT,
            time TEXT,
            training_type TEXT,
            seats TEXT,
            assessment_details TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Assignments reference trainings and are wiped on every catalog refresh
async fn create_training_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            training_id INTEGER NOT NULL REFERENCES training_details(id),
            employee_empid TEXT NOT NULL REFERENCES users(username),
            manager_empid TEXT NOT NULL REFERENCES users(username),
            assignment_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
