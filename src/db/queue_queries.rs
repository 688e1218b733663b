// db/queue_queries.rs - Operation queue persistence

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::queue::{Operation, OperationKind, OperationStatus, QueueStats};
use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: String,
    account_id: String,
    timestamp: DateTime<Utc>,
    retry_count: i64,
    last_error: Option<String>,
    updated_by: String,
    version: i64,
    payload: String,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
}

impl OperationRow {
    /// Validates the persisted tag and payload shape before execution
    fn into_model(self) -> Result<Operation> {
        let kind: OperationKind = serde_json::from_str(&self.payload)?;
        let status = OperationStatus::parse(&self.status).ok_or_else(|| {
            Error::Serialization(format!("Unknown operation status: {}", self.status))
        })?;

        Ok(Operation {
            scheduled_at: self.scheduled_at.unwrap_or(self.timestamp),
            id: self.id,
            account_id: self.account_id,
            kind,
            timestamp: self.timestamp,
            retry_count: self.retry_count,
            last_error: self.last_error,
            updated_by: self.updated_by,
            version: self.version,
            status,
        })
    }
}

const SELECT_COLUMNS: &str = "id, account_id, timestamp, retry_count, last_error, \
                              updated_by, version, payload, status, scheduled_at";

pub async fn insert_operation(pool: &SqlitePool, operation: &Operation) -> Result<()> {
    let payload = serde_json::to_string(&operation.kind)?;

    sqlx::query(
        r#"
        INSERT INTO operations (
            id, account_id, op_type, timestamp, retry_count, last_error,
            updated_by, version, payload, status, scheduled_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&operation.id)
    .bind(&operation.account_id)
    .bind(operation.kind.op_type())
    .bind(operation.timestamp)
    .bind(operation.retry_count)
    .bind(&operation.last_error)
    .bind(&operation.updated_by)
    .bind(operation.version)
    .bind(payload)
    .bind(operation.status.as_str())
    .bind(operation.scheduled_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_operation(pool: &SqlitePool, id: &str) -> Result<Option<Operation>> {
    let row = sqlx::query_as::<_, OperationRow>(&format!(
        "SELECT {} FROM operations WHERE id = ?",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(OperationRow::into_model).transpose()
}

/// All pending operations sorted by `(account_id, timestamp, id)`
pub async fn load_pending(pool: &SqlitePool) -> Result<Vec<Operation>> {
    let rows = sqlx::query_as::<_, OperationRow>(&format!(
        r#"
        SELECT {} FROM operations
        WHERE status = 'pending'
        ORDER BY account_id ASC, timestamp ASC, id ASC
        "#,
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OperationRow::into_model).collect()
}

/// Pending operations for one account whose backoff schedule has elapsed,
/// in delivery order (ties on timestamp broken by id)
pub async fn due_pending_for_account(
    pool: &SqlitePool,
    account_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Operation>> {
    let rows = sqlx::query_as::<_, OperationRow>(&format!(
        r#"
        SELECT {} FROM operations
        WHERE status = 'pending'
          AND account_id = ?
          AND (scheduled_at IS NULL OR scheduled_at <= ?)
        ORDER BY timestamp ASC, id ASC
        "#,
        SELECT_COLUMNS
    ))
    .bind(account_id)
    .bind(now)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OperationRow::into_model).collect()
}

pub async fn accounts_with_pending(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT account_id FROM operations WHERE status = 'pending' ORDER BY account_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn delete_operation(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM operations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn record_failure(
    pool: &SqlitePool,
    id: &str,
    retry_count: i64,
    error: &str,
    scheduled_at: DateTime<Utc>,
    status: OperationStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE operations
        SET retry_count = ?, last_error = ?, scheduled_at = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(retry_count)
    .bind(error)
    .bind(scheduled_at)
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_last_error(pool: &SqlitePool, id: &str, error: &str) -> Result<()> {
    sqlx::query("UPDATE operations SET last_error = ? WHERE id = ?")
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn abandoned_for_account(pool: &SqlitePool, account_id: &str) -> Result<Vec<Operation>> {
    let rows = sqlx::query_as::<_, OperationRow>(&format!(
        r#"
        SELECT {} FROM operations
        WHERE status = 'abandoned' AND account_id = ?
        ORDER BY timestamp ASC, id ASC
        "#,
        SELECT_COLUMNS
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OperationRow::into_model).collect()
}

pub async fn stats(pool: &SqlitePool, account_id: &str) -> Result<QueueStats> {
    let pending_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM operations WHERE status = 'pending' AND account_id = ?",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    let abandoned_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM operations WHERE status = 'abandoned' AND account_id = ?",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    let oldest_pending: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        SELECT timestamp FROM operations
        WHERE status = 'pending' AND account_id = ?
        ORDER BY timestamp ASC LIMIT 1
        "#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(QueueStats {
        pending_count,
        abandoned_count,
        oldest_pending,
    })
}

pub async fn reset_abandoned(pool: &SqlitePool, account_id: &str) -> Result<i64> {
    let result = sqlx::query(
        r#"
        UPDATE operations
        SET status = 'pending', retry_count = 0, last_error = NULL, scheduled_at = timestamp
        WHERE status = 'abandoned' AND account_id = ?
        "#,
    )
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as i64)
}

pub async fn clear_abandoned(pool: &SqlitePool, account_id: &str) -> Result<i64> {
    let result =
        sqlx::query("DELETE FROM operations WHERE status = 'abandoned' AND account_id = ?")
            .bind(account_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() as i64)
}
