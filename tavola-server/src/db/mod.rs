//! Database Module
//!
//! SQLite connection pool bootstrap and per-entity query modules.

pub mod menu_items;
pub mod orders;
pub mod payments;
pub mod restaurants;
pub mod tables;

use std::str::FromStr;

use shared::AppError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

/// Embedded migrations, applied on every startup
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open the on-disk database with WAL mode and run migrations
pub async fn connect(db_path: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
        .map_err(|e| AppError::database(format!("Invalid database path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .pragma("foreign_keys", "ON");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

    // busy_timeout: wait 5s on write contention instead of failing outright
    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to set busy_timeout: {e}")))?;

    tracing::info!("Database connection established (SQLite WAL, busy_timeout=5000ms)");

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to apply migrations: {e}")))?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// In-memory database with the same schema, for tests and demos.
///
/// Single connection only: every pooled connection of an in-memory SQLite
/// database would otherwise see its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| AppError::database(e.to_string()))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| AppError::database(format!("Failed to open in-memory database: {e}")))?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to apply migrations: {e}")))?;

    Ok(pool)
}
