// db/conflict_queries.rs - Conflict persistence keyed by fingerprint

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::conflict::{Conflict, ConflictSide, ConflictType, Resolution};
use crate::models::EntityType;
use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct ConflictRow {
    fingerprint: String,
    account_id: String,
    entity_type: String,
    entity_id: String,
    conflict_type: String,
    field: String,
    local_data: String,
    local_timestamp: DateTime<Utc>,
    local_version: i64,
    server_data: String,
    server_timestamp: DateTime<Utc>,
    server_version: i64,
    created_at: DateTime<Utc>,
    resolved: bool,
    resolution: Option<String>,
}

impl ConflictRow {
    fn into_model(self) -> Result<Conflict> {
        let entity_type = EntityType::parse(&self.entity_type).ok_or_else(|| {
            Error::Serialization(format!("Unknown entity type: {}", self.entity_type))
        })?;
        let conflict_type = ConflictType::parse(&self.conflict_type).ok_or_else(|| {
            Error::Serialization(format!("Unknown conflict type: {}", self.conflict_type))
        })?;
        let resolution = match self.resolution {
            Some(raw) => Some(Resolution::parse(&raw).ok_or_else(|| {
                Error::Serialization(format!("Unknown resolution: {}", raw))
            })?),
            None => None,
        };

        Ok(Conflict {
            fingerprint: self.fingerprint,
            account_id: self.account_id,
            entity_type,
            entity_id: self.entity_id,
            conflict_type,
            field: self.field,
            local: ConflictSide {
                data: serde_json::from_str(&self.local_data)?,
                timestamp: self.local_timestamp,
                version: self.local_version,
            },
            server: ConflictSide {
                data: serde_json::from_str(&self.server_data)?,
                timestamp: self.server_timestamp,
                version: self.server_version,
            },
            created_at: self.created_at,
            resolved: self.resolved,
            resolution,
        })
    }
}

/// Store a conflict; re-detection of the same fingerprint overwrites
pub async fn upsert_conflict(pool: &SqlitePool, conflict: &Conflict) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO conflicts (
            fingerprint, account_id, entity_type, entity_id, conflict_type,
            field, local_data, local_timestamp, local_version,
            server_data, server_timestamp, server_version,
            created_at, resolved, resolution
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&conflict.fingerprint)
    .bind(&conflict.account_id)
    .bind(conflict.entity_type.as_str())
    .bind(&conflict.entity_id)
    .bind(conflict.conflict_type.as_str())
    .bind(&conflict.field)
    .bind(serde_json::to_string(&conflict.local.data)?)
    .bind(conflict.local.timestamp)
    .bind(conflict.local.version)
    .bind(serde_json::to_string(&conflict.server.data)?)
    .bind(conflict.server.timestamp)
    .bind(conflict.server.version)
    .bind(conflict.created_at)
    .bind(conflict.resolved)
    .bind(conflict.resolution.map(Resolution::as_str))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_conflict(pool: &SqlitePool, fingerprint: &str) -> Result<Option<Conflict>> {
    let row = sqlx::query_as::<_, ConflictRow>("SELECT * FROM conflicts WHERE fingerprint = ?")
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

    row.map(ConflictRow::into_model).transpose()
}

/// Clear unresolved conflicts for an `(entity_type, account)` scope before
/// storing a fresh detection snapshot. Resolved rows stay for audit.
pub async fn clear_unresolved_scope(
    pool: &SqlitePool,
    entity_type: EntityType,
    account_id: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM conflicts WHERE resolved = 0 AND entity_type = ? AND account_id = ?",
    )
    .bind(entity_type.as_str())
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Open conflicts naming a specific entity (the drain's conflict gate)
pub async fn open_for_entity(
    pool: &SqlitePool,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<Vec<Conflict>> {
    let rows = sqlx::query_as::<_, ConflictRow>(
        r#"
        SELECT * FROM conflicts
        WHERE resolved = 0 AND entity_type = ? AND entity_id = ?
        ORDER BY created_at ASC
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ConflictRow::into_model).collect()
}

pub async fn has_open_for_entity(
    pool: &SqlitePool,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conflicts WHERE resolved = 0 AND entity_type = ? AND entity_id = ?",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn open_for_account(pool: &SqlitePool, account_id: &str) -> Result<Vec<Conflict>> {
    let rows = sqlx::query_as::<_, ConflictRow>(
        r#"
        SELECT * FROM conflicts
        WHERE resolved = 0 AND account_id = ?
        ORDER BY created_at ASC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ConflictRow::into_model).collect()
}

pub async fn mark_resolved(
    pool: &SqlitePool,
    fingerprint: &str,
    resolution: Resolution,
) -> Result<()> {
    sqlx::query("UPDATE conflicts SET resolved = 1, resolution = ? WHERE fingerprint = ?")
        .bind(resolution.as_str())
        .bind(fingerprint)
        .execute(pool)
        .await?;

    Ok(())
}
