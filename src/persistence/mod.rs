//! Persistence Layer
//!
//! SQLite-backed storage for the activity ledger. The ledger table is
//! append-only from the application's point of view: entries are inserted
//! in sequence order and read back sequentially at startup to recover the
//! hash-chain tip.
//!
//! # Database Schema
//!
//! ## activity_ledger
//! - sequence: INTEGER PRIMARY KEY (gap-free, assigned by the ledger)
//! - action: event label (risk_decision, execution_result, ...)
//! - payload_json: opaque JSON payload
//! - entry_hash: SHA-256 over the canonical entry serialization
//! - previous_hash: prior entry's hash ("genesis" for sequence 0)
//! - logged_at_ms: unix milliseconds, part of the hash input

pub mod ledger_store;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Initialize the database connection pool and run migrations.
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/solguard.db")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(database_url, 5).await
}

/// As `init_database`, with an explicit pool size. Tests use a single
/// connection so `sqlite::memory:` stays one database.
pub async fn init_database_with(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_ledger (
            sequence INTEGER PRIMARY KEY,
            action TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            entry_hash TEXT NOT NULL,
            previous_hash TEXT NOT NULL,
            logged_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create activity_ledger table: {}", e))
    })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_action ON activity_ledger(action)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init_and_migrations() {
        let pool = init_database_with("sqlite::memory:", 1).await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='activity_ledger'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database_with("sqlite::memory:", 1).await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }
}
