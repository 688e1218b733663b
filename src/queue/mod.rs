// queue/mod.rs - Persistent outbound operation queue

mod operation;

pub use operation::{Operation, OperationKind, OperationStatus};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::context::ContextManager;
use crate::db::queue_queries;
use crate::{Error, Result};

/// Retries before an operation is moved to the abandoned surface
pub const MAX_RETRIES: i64 = 5;

/// Backoff ceiling in seconds
pub const BACKOFF_CEILING_SECS: i64 = 60;

/// Caller-supplied overrides for enqueue defaults
#[derive(Debug, Clone, Default)]
pub struct OperationMetadata {
    pub account_id: Option<String>,
    pub version: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Queue statistics for one account, surfaced to the UI's retry-sync flow
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    pub pending_count: i64,
    pub abandoned_count: i64,
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// Ordered, persistent FIFO of intended server writes
///
/// The operations table is the authoritative source; the in-memory mirror
/// is rebuilt from it on startup and only updated after a persistent write
/// succeeds.
pub struct OperationQueue {
    pool: SqlitePool,
    context: Arc<ContextManager>,
    memory: RwLock<Vec<Operation>>,
}

impl OperationQueue {
    pub fn new(pool: SqlitePool, context: Arc<ContextManager>) -> Self {
        Self {
            pool,
            context,
            memory: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild the in-memory mirror from storage, sorted by
    /// `(account_id, timestamp, id)`
    pub async fn init(&self) -> Result<()> {
        let pending = queue_queries::load_pending(&self.pool).await?;
        let count = pending.len();

        let mut memory = self.memory.write().await;
        *memory = pending;

        tracing::info!("Operation queue initialized with {} pending operations", count);
        Ok(())
    }

    /// Enqueue an intended server write
    ///
    /// Identity comes from the ambient context, never from a live auth
    /// call. The caller must have committed its optimistic entity write
    /// before calling this.
    pub async fn add(
        &self,
        kind: OperationKind,
        metadata: Option<OperationMetadata>,
    ) -> Result<String> {
        let context = self.context.get().await;
        let user_id = context.user_id.clone().ok_or_else(|| {
            Error::OfflineContext("No user id in offline context".to_string())
        })?;
        let account_id = context.account_id.clone().ok_or_else(|| {
            Error::OfflineContext("No account id in offline context".to_string())
        })?;

        let metadata = metadata.unwrap_or_default();
        let timestamp = metadata.timestamp.unwrap_or_else(Utc::now);

        let operation = Operation {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: metadata.account_id.unwrap_or(account_id),
            kind,
            timestamp,
            retry_count: 0,
            last_error: None,
            updated_by: user_id,
            version: metadata.version.unwrap_or(1),
            status: OperationStatus::Pending,
            scheduled_at: timestamp,
        };

        queue_queries::insert_operation(&self.pool, &operation).await?;

        // Mirror only after the persistent write succeeded
        let id = operation.id.clone();
        let op_type = operation.kind.op_type();
        let mut memory = self.memory.write().await;
        memory.push(operation);
        memory.sort_by(|a, b| {
            (a.account_id.as_str(), a.timestamp, a.id.as_str())
                .cmp(&(b.account_id.as_str(), b.timestamp, b.id.as_str()))
        });

        tracing::debug!("Enqueued {} operation {}", op_type, id);
        Ok(id)
    }

    /// Accounts that currently have pending work
    pub async fn accounts_with_pending(&self) -> Result<Vec<String>> {
        queue_queries::accounts_with_pending(&self.pool).await
    }

    /// Pending operations for one account whose retry schedule has come
    /// due, in delivery order
    pub async fn due_for_account(&self, account_id: &str) -> Result<Vec<Operation>> {
        queue_queries::due_pending_for_account(&self.pool, account_id, Utc::now()).await
    }

    /// All pending operations in delivery order (restart-safe snapshot)
    pub async fn pending(&self) -> Result<Vec<Operation>> {
        queue_queries::load_pending(&self.pool).await
    }

    pub async fn len(&self) -> usize {
        self.memory.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.read().await.is_empty()
    }

    /// Remove an operation after a successful server round-trip
    pub async fn mark_completed(&self, operation_id: &str) -> Result<()> {
        queue_queries::delete_operation(&self.pool, operation_id).await?;

        let mut memory = self.memory.write().await;
        memory.retain(|op| op.id != operation_id);

        tracing::debug!("Completed operation {}", operation_id);
        Ok(())
    }

    /// Record a transient failure: bump the retry count, schedule the next
    /// attempt with exponential backoff, abandon after the retry budget
    pub async fn mark_failed(&self, operation_id: &str, error: &str) -> Result<OperationStatus> {
        let Some(op) = queue_queries::get_operation(&self.pool, operation_id).await? else {
            return Err(Error::NotFound(format!("Operation {}", operation_id)));
        };

        let retry_count = op.retry_count + 1;
        let status = if retry_count >= MAX_RETRIES {
            OperationStatus::Abandoned
        } else {
            OperationStatus::Pending
        };
        let scheduled_at = Utc::now() + backoff_delay(retry_count);

        queue_queries::record_failure(
            &self.pool,
            operation_id,
            retry_count,
            error,
            scheduled_at,
            status,
        )
        .await?;

        let mut memory = self.memory.write().await;
        if status == OperationStatus::Abandoned {
            // The mirror holds pending work only
            memory.retain(|o| o.id != operation_id);
        } else if let Some(entry) = memory.iter_mut().find(|o| o.id == operation_id) {
            entry.retry_count = retry_count;
            entry.last_error = Some(error.to_string());
            entry.scheduled_at = scheduled_at;
        }
        if status == OperationStatus::Abandoned {
            tracing::warn!(
                "Operation {} abandoned after {} retries: {}",
                operation_id,
                retry_count,
                error
            );
        } else {
            tracing::debug!(
                "Operation {} failed (retry {}): {}",
                operation_id,
                retry_count,
                error
            );
        }

        Ok(status)
    }

    /// Record that a stored conflict is gating this operation. Does not
    /// consume retry budget.
    pub async fn mark_blocked(&self, operation_id: &str) -> Result<()> {
        queue_queries::set_last_error(&self.pool, operation_id, "Blocked by conflict").await?;

        let mut memory = self.memory.write().await;
        if let Some(entry) = memory.iter_mut().find(|o| o.id == operation_id) {
            entry.last_error = Some("Blocked by conflict".to_string());
        }

        Ok(())
    }

    /// Abandoned operations for the UI error surface
    pub async fn abandoned(&self, account_id: &str) -> Result<Vec<Operation>> {
        queue_queries::abandoned_for_account(&self.pool, account_id).await
    }

    pub async fn stats(&self, account_id: &str) -> Result<QueueStats> {
        queue_queries::stats(&self.pool, account_id).await
    }

    /// Reset abandoned operations for another round of drains
    pub async fn retry_abandoned(&self, account_id: &str) -> Result<i64> {
        let reset = queue_queries::reset_abandoned(&self.pool, account_id).await?;
        if reset > 0 {
            self.init().await?;
            tracing::info!("Reset {} abandoned operations for retry", reset);
        }
        Ok(reset)
    }

    /// Drop abandoned operations (explicit user intervention only; the
    /// engine itself never deletes unexecuted intent)
    pub async fn clear_abandoned(&self, account_id: &str) -> Result<i64> {
        let cleared = queue_queries::clear_abandoned(&self.pool, account_id).await?;
        if cleared > 0 {
            tracing::info!("Cleared {} abandoned operations", cleared);
        }
        Ok(cleared)
    }
}

/// Exponential backoff with jitter: `2^retry_count` seconds capped at the
/// ceiling, plus up to one second of random spread
pub fn backoff_delay(retry_count: i64) -> ChronoDuration {
    let base = 2_i64
        .checked_pow(retry_count.clamp(0, 16) as u32)
        .unwrap_or(BACKOFF_CEILING_SECS)
        .min(BACKOFF_CEILING_SECS);
    let jitter_ms = rand::thread_rng().gen_range(0..1000);

    ChronoDuration::seconds(base) + ChronoDuration::milliseconds(jitter_ms)
}
