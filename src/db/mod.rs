// db/mod.rs - Local store with SQLx integration

pub mod cache_queries;
pub mod conflict_queries;
pub mod entity_queries;
pub mod media_queries;
pub mod migrations;
pub mod queue_queries;

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Durable keyed storage for entities, operations, conflicts, media and
/// ambient context, with connection pooling
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Create new database connection with migrations
    ///
    /// Uses WAL mode for better concurrency and enables foreign keys.
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| Error::OfflineStorage(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            // Enable Write-Ahead Logging for better concurrency
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // Enable foreign key constraints
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::OfflineStorage(format!("Failed to open local store: {}", e)))?;

        migrations::run(&pool).await?;

        Ok(Self { pool })
    }

    /// Open the store at the platform-default location
    /// (`<data_dir>/atelier/atelier.db`).
    pub async fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("No platform data directory".to_string()))?
            .join("atelier");
        tokio::fs::create_dir_all(&dir).await?;
        Self::new(&dir.join("atelier.db")).await
    }

    /// In-memory store for tests and ephemeral sessions
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::OfflineStorage(e.to_string()))?;

        // A single connection keeps every query on the same in-memory db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::OfflineStorage(e.to_string()))?;

        migrations::run(&pool).await?;

        Ok(Self { pool })
    }

    /// Execute health check query
    pub async fn health_check(&self) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;

        Ok(result.0 == 1)
    }
}

// Ensure pool is Send + Sync for cross-thread sharing
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_all() {
        assert_send_sync::<Database>();
    }
};
