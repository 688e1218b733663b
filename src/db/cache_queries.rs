// db/cache_queries.rs - Generic cache rows and per-account metadata caches

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::metadata::{BudgetCategory, TaxPreset, VendorDefault};
use crate::models::CacheEntry;
use crate::Result;

// ============================================================================
// Generic cache
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CacheRow {
    key: String,
    data: String,
    timestamp: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

pub async fn set_cache(
    pool: &SqlitePool,
    key: &str,
    data: &serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO cache (key, data, timestamp, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(key)
    .bind(serde_json::to_string(data)?)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_cache(pool: &SqlitePool, key: &str) -> Result<Option<CacheEntry>> {
    let row = sqlx::query_as::<_, CacheRow>("SELECT * FROM cache WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else { return Ok(None) };

    // Expired entries read as absent
    if let Some(expires_at) = row.expires_at {
        if expires_at < Utc::now() {
            return Ok(None);
        }
    }

    Ok(Some(CacheEntry {
        key: row.key,
        data: serde_json::from_str(&row.data)?,
        timestamp: row.timestamp,
        expires_at: row.expires_at,
    }))
}

pub async fn purge_expired_cache(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Per-account metadata caches
// ============================================================================

pub async fn replace_budget_categories(
    pool: &SqlitePool,
    account_id: &str,
    categories: &[BudgetCategory],
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM budget_categories WHERE account_id = ?")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    for category in categories {
        sqlx::query(
            r#"
            INSERT INTO budget_categories (account_id, id, name, sort_order, cached_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(&category.id)
        .bind(&category.name)
        .bind(category.sort_order)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn cached_budget_categories(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Vec<BudgetCategory>> {
    let categories = sqlx::query_as::<_, BudgetCategory>(
        r#"
        SELECT id, name, sort_order FROM budget_categories
        WHERE account_id = ?
        ORDER BY sort_order ASC, name ASC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(categories)
}

pub async fn replace_tax_presets(
    pool: &SqlitePool,
    account_id: &str,
    presets: &[TaxPreset],
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM tax_presets WHERE account_id = ?")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    for preset in presets {
        sqlx::query(
            r#"
            INSERT INTO tax_presets (account_id, id, name, rate_pct, cached_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(&preset.id)
        .bind(&preset.name)
        .bind(preset.rate_pct)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn cached_tax_presets(pool: &SqlitePool, account_id: &str) -> Result<Vec<TaxPreset>> {
    let presets = sqlx::query_as::<_, TaxPreset>(
        "SELECT id, name, rate_pct FROM tax_presets WHERE account_id = ? ORDER BY name ASC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(presets)
}

pub async fn replace_vendor_defaults(
    pool: &SqlitePool,
    account_id: &str,
    defaults: &[VendorDefault],
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM vendor_defaults WHERE account_id = ?")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    for default in defaults {
        sqlx::query(
            r#"
            INSERT INTO vendor_defaults (account_id, slot, name, cached_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(default.slot)
        .bind(&default.name)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn cached_vendor_defaults(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Vec<VendorDefault>> {
    let defaults = sqlx::query_as::<_, VendorDefault>(
        "SELECT slot, name FROM vendor_defaults WHERE account_id = ? ORDER BY slot ASC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;

    #[tokio::test]
    async fn cache_round_trips_and_expires() {
        let db = Database::in_memory().await.unwrap();

        let payload = serde_json::json!({"rates": [1, 2, 3]});
        set_cache(&db.pool, "rates:acct-1", &payload, None)
            .await
            .unwrap();

        let entry = get_cache(&db.pool, "rates:acct-1").await.unwrap().unwrap();
        assert_eq!(entry.data, payload);

        // An already-expired entry reads as absent and can be purged
        set_cache(
            &db.pool,
            "stale:acct-1",
            &payload,
            Some(Utc::now() - Duration::minutes(1)),
        )
        .await
        .unwrap();
        assert!(get_cache(&db.pool, "stale:acct-1").await.unwrap().is_none());

        let purged = purge_expired_cache(&db.pool).await.unwrap();
        assert_eq!(purged, 1);
        assert!(get_cache(&db.pool, "rates:acct-1").await.unwrap().is_some());
    }
}
