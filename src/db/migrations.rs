// db/migrations.rs - Local store schema migrations

use crate::Result;
use sqlx::SqlitePool;

/// Tables the engine cannot run without. Checked after every upgrade; a
/// missing table means a prior upgrade aborted partway.
const REQUIRED_TABLES: &[&str] = &[
    "items",
    "transactions",
    "projects",
    "operations",
    "cache",
    "conflicts",
    "media",
    "media_upload_queue",
    "sync_context",
    "budget_categories",
    "tax_presets",
    "vendor_defaults",
];

/// Run all migrations, recovering with a destructive reset if the schema
/// turns out broken afterwards
///
/// Migrations are idempotent and safe to run multiple times.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    apply(pool).await?;

    if let Some(missing) = first_missing_table(pool).await? {
        // A prior upgrade aborted between steps. Dropping and recreating
        // the schema is the only legal recovery path.
        tracing::warn!(
            "Required table '{}' missing after migration, resetting local store",
            missing
        );
        destructive_reset(pool).await?;
        apply(pool).await?;
    }

    Ok(())
}

/// Highest applied migration id (the schema version)
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.0.unwrap_or(0))
}

async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create migrations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Run migrations in order
    run_if_needed(pool, 1, "create_items_table").await?;
    run_if_needed(pool, 2, "create_transactions_table").await?;
    run_if_needed(pool, 3, "create_projects_table").await?;
    run_if_needed(pool, 4, "create_operations_table").await?;
    run_if_needed(pool, 5, "create_cache_table").await?;
    run_if_needed(pool, 6, "create_conflicts_table").await?;
    run_if_needed(pool, 7, "create_media_tables").await?;
    run_if_needed(pool, 8, "create_context_table").await?;
    run_if_needed(pool, 9, "create_metadata_tables").await?;
    run_if_needed(pool, 10, "create_indices").await?;
    run_if_needed(pool, 11, "add_operation_scheduling").await?;

    Ok(())
}

/// Check if migration is needed and run the appropriate SQL
async fn run_if_needed(pool: &SqlitePool, id: i32, name: &str) -> Result<()> {
    let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;

    if exists.0 == 0 {
        tracing::info!("Running migration {}: {}", id, name);

        match id {
            1 => create_items_table(pool).await?,
            2 => create_transactions_table(pool).await?,
            3 => create_projects_table(pool).await?,
            4 => create_operations_table(pool).await?,
            5 => create_cache_table(pool).await?,
            6 => create_conflicts_table(pool).await?,
            7 => create_media_tables(pool).await?,
            8 => create_context_table(pool).await?,
            9 => create_metadata_tables(pool).await?,
            10 => create_indices(pool).await?,
            11 => add_operation_scheduling(pool).await?,
            _ => {
                return Err(crate::Error::Config(format!(
                    "Unknown migration id: {}",
                    id
                )))
            }
        }

        sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await?;

        tracing::info!("Migration {} completed", id);
    }

    Ok(())
}

async fn first_missing_table(pool: &SqlitePool) -> Result<Option<&'static str>> {
    for table in REQUIRED_TABLES {
        let exists: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if exists.0 == 0 {
            return Ok(Some(table));
        }
    }
    Ok(None)
}

/// Drop every engine table so `apply` can rebuild the schema from scratch.
/// Queued work is lost; this only runs when the schema is already broken.
async fn destructive_reset(pool: &SqlitePool) -> Result<()> {
    for table in REQUIRED_TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }
    sqlx::query("DROP TABLE IF EXISTS _migrations")
        .execute(pool)
        .await?;

    tracing::warn!("Local store reset: all tables dropped");
    Ok(())
}

/// Migration 1: Create items table
async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            item_id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            qr_key TEXT,
            created_by TEXT,
            date_created TEXT NOT NULL,
            origin_transaction_id TEXT,
            name TEXT NOT NULL,
            description TEXT,
            source TEXT,
            sku TEXT,
            price REAL,
            purchase_price REAL,
            project_price REAL,
            market_value REAL,
            payment_method TEXT,
            disposition TEXT,
            notes TEXT,
            space TEXT,
            tax_rate_pct REAL,
            tax_amount_purchase_price REAL,
            tax_amount_project_price REAL,
            bookmark INTEGER NOT NULL DEFAULT 0,
            inventory_status TEXT,
            business_inventory_location TEXT,
            project_id TEXT,
            transaction_id TEXT,
            latest_transaction_id TEXT,
            primary_image_url TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            last_updated TEXT NOT NULL,
            last_synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 2: Create transactions table
async fn create_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            transaction_id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            project_id TEXT,
            created_by TEXT,
            transaction_date TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            allocated_amount REAL,
            category_id TEXT,
            tax_rate_preset TEXT,
            tax_rate_pct REAL,
            subtotal REAL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending', 'completed', 'canceled')),
            notes TEXT,
            item_ids TEXT NOT NULL DEFAULT '[]',
            needs_review INTEGER NOT NULL DEFAULT 0,
            sum_item_purchase_prices REAL,
            reimbursement_type TEXT,
            trigger_event TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            last_updated TEXT NOT NULL,
            last_synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 3: Create projects table
async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            budget REAL,
            design_fee REAL,
            default_category_id TEXT,
            status TEXT,
            settings TEXT NOT NULL DEFAULT '{}',
            budget_categories TEXT NOT NULL DEFAULT '[]',
            version INTEGER NOT NULL DEFAULT 1,
            last_updated TEXT NOT NULL,
            last_synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 4: Create operations table (outbound queue)
async fn create_operations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operations (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            op_type TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_by TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 5: Create generic cache table
async fn create_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 6: Create conflicts table keyed by deterministic fingerprint
async fn create_conflicts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conflicts (
            fingerprint TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            conflict_type TEXT NOT NULL,
            field TEXT NOT NULL,
            local_data TEXT NOT NULL,
            local_timestamp TEXT NOT NULL,
            local_version INTEGER NOT NULL,
            server_data TEXT NOT NULL,
            server_timestamp TEXT NOT NULL,
            server_version INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolution TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 7: Create media and media upload queue tables
async fn create_media_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            bytes BLOB NOT NULL,
            uploaded_at TEXT NOT NULL,
            expires_at TEXT,
            remote_url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_upload_queue (
            id TEXT PRIMARY KEY,
            media_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            metadata TEXT,
            queued_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 8: Create ambient context singleton table
async fn create_context_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_context (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            account_id TEXT,
            last_known_user_id TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 9: Create per-account metadata cache tables
async fn create_metadata_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS budget_categories (
            account_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (account_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tax_presets (
            account_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            rate_pct REAL NOT NULL,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (account_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendor_defaults (
            account_id TEXT NOT NULL,
            slot INTEGER NOT NULL,
            name TEXT NOT NULL,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (account_id, slot)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration 10: Create secondary indices
async fn create_indices(pool: &SqlitePool) -> Result<()> {
    let indices = [
        "CREATE INDEX IF NOT EXISTS idx_items_project ON items(project_id)",
        "CREATE INDEX IF NOT EXISTS idx_items_account ON items(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_items_last_updated ON items(last_updated)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_project ON transactions(project_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date)",
        "CREATE INDEX IF NOT EXISTS idx_operations_account ON operations(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_operations_timestamp ON operations(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_operations_type ON operations(op_type)",
        "CREATE INDEX IF NOT EXISTS idx_operations_account_timestamp ON operations(account_id, timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_cache_timestamp ON cache(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_account ON conflicts(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_resolved ON conflicts(resolved)",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_created ON conflicts(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_entity ON conflicts(entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_type_account ON conflicts(entity_type, account_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_item ON media(item_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_account ON media(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_expires ON media(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_media_upload_media ON media_upload_queue(media_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_upload_account ON media_upload_queue(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_upload_item ON media_upload_queue(item_id)",
        "CREATE INDEX IF NOT EXISTS idx_media_upload_queued ON media_upload_queue(queued_at)",
    ];

    for sql in indices {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Migration 11: Add explicit status and retry scheduling to operations
async fn add_operation_scheduling(pool: &SqlitePool) -> Result<()> {
    let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as("PRAGMA table_info(operations)")
            .fetch_all(pool)
            .await?;
    let has = |name: &str| columns.iter().any(|c| c.1 == name);

    if !has("status") {
        sqlx::query(
            "ALTER TABLE operations ADD COLUMN status TEXT NOT NULL DEFAULT 'pending'",
        )
        .execute(pool)
        .await?;
    }

    if !has("scheduled_at") {
        sqlx::query("ALTER TABLE operations ADD COLUMN scheduled_at TEXT")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();

        // Re-running the full set must be a no-op
        run(&db.pool).await.unwrap();
        run(&db.pool).await.unwrap();

        let version = schema_version(&db.pool).await.unwrap();
        assert_eq!(version, 11);
    }

    #[tokio::test]
    async fn broken_schema_triggers_destructive_reset() {
        let db = Database::in_memory().await.unwrap();

        // Simulate an aborted upgrade: a required table vanished but the
        // migration ledger claims everything ran.
        sqlx::query("DROP TABLE conflicts")
            .execute(&db.pool)
            .await
            .unwrap();

        run(&db.pool).await.unwrap();

        let missing = first_missing_table(&db.pool).await.unwrap();
        assert!(missing.is_none());
    }
}
