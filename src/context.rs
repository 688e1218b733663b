// context.rs - Ambient offline identity, persisted and broadcast

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, RwLock};

use crate::models::OfflineContext;
use crate::Result;

/// Key of the singleton row in `sync_context`
const CONTEXT_KEY: &str = "active-context";

#[derive(Debug, sqlx::FromRow)]
struct ContextRow {
    user_id: Option<String>,
    account_id: Option<String>,
    last_known_user_id: Option<String>,
    updated_at: Option<chrono::DateTime<Utc>>,
}

/// Process-wide `(user_id, account_id)` identity used to stamp queued
/// operations without a live auth call
///
/// The persisted singleton row is the source of truth; the in-memory
/// mirror serves synchronous snapshots and subscribers get every change.
pub struct ContextManager {
    pool: SqlitePool,
    current: RwLock<OfflineContext>,
    last_known_user_id: RwLock<Option<String>>,
    changes: broadcast::Sender<OfflineContext>,
}

impl ContextManager {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            pool,
            current: RwLock::new(OfflineContext::default()),
            last_known_user_id: RwLock::new(None),
            changes,
        }
    }

    /// Load the persisted context into memory (startup)
    pub async fn init(&self) -> Result<()> {
        let row = sqlx::query_as::<_, ContextRow>(
            "SELECT user_id, account_id, last_known_user_id, updated_at FROM sync_context WHERE id = ?",
        )
        .bind(CONTEXT_KEY)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            *self.current.write().await = OfflineContext {
                user_id: row.user_id,
                account_id: row.account_id,
                updated_at: row.updated_at,
            };
            *self.last_known_user_id.write().await = row.last_known_user_id;
        }

        Ok(())
    }

    /// Persist and broadcast a new identity (sign-in or account switch)
    pub async fn set(&self, user_id: &str, account_id: &str) -> Result<()> {
        let context = OfflineContext {
            user_id: Some(user_id.to_string()),
            account_id: Some(account_id.to_string()),
            updated_at: Some(Utc::now()),
        };

        self.persist(&context, Some(user_id)).await?;

        *self.current.write().await = context.clone();
        *self.last_known_user_id.write().await = Some(user_id.to_string());
        let _ = self.changes.send(context);

        tracing::info!("Offline context set for account {}", account_id);
        Ok(())
    }

    /// Clear identity on sign-out. The last known user id survives so
    /// orphaned queued work can still be surfaced.
    pub async fn clear(&self) -> Result<()> {
        let context = OfflineContext {
            user_id: None,
            account_id: None,
            updated_at: Some(Utc::now()),
        };

        let last_known = self.last_known_user_id.read().await.clone();
        self.persist(&context, last_known.as_deref()).await?;

        *self.current.write().await = context.clone();
        let _ = self.changes.send(context);

        tracing::info!("Offline context cleared");
        Ok(())
    }

    /// Immediate snapshot of the current identity
    pub async fn get(&self) -> OfflineContext {
        self.current.read().await.clone()
    }

    /// Most recent non-null user id, even after sign-out
    pub async fn last_known_user_id(&self) -> Option<String> {
        self.last_known_user_id.read().await.clone()
    }

    /// Subscribe to context changes
    pub fn subscribe(&self) -> broadcast::Receiver<OfflineContext> {
        self.changes.subscribe()
    }

    async fn persist(&self, context: &OfflineContext, last_known: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_context (id, user_id, account_id, last_known_user_id, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                account_id = excluded.account_id,
                last_known_user_id = excluded.last_known_user_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(CONTEXT_KEY)
        .bind(&context.user_id)
        .bind(&context.account_id)
        .bind(last_known)
        .bind(context.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn context_round_trips_through_storage() {
        let db = Database::in_memory().await.unwrap();
        let manager = ContextManager::new(db.pool.clone());

        manager.set("user-1", "acct-1").await.unwrap();

        // A fresh manager over the same storage sees the persisted row
        let reloaded = ContextManager::new(db.pool.clone());
        reloaded.init().await.unwrap();

        let context = reloaded.get().await;
        assert_eq!(context.user_id.as_deref(), Some("user-1"));
        assert_eq!(context.account_id.as_deref(), Some("acct-1"));
        assert!(context.is_complete());
    }

    #[tokio::test]
    async fn last_known_user_survives_sign_out() {
        let db = Database::in_memory().await.unwrap();
        let manager = ContextManager::new(db.pool.clone());

        manager.set("user-1", "acct-1").await.unwrap();
        manager.clear().await.unwrap();

        let context = manager.get().await;
        assert!(context.user_id.is_none());
        assert!(context.account_id.is_none());
        assert_eq!(manager.last_known_user_id().await.as_deref(), Some("user-1"));

        // And it survives a restart too
        let reloaded = ContextManager::new(db.pool.clone());
        reloaded.init().await.unwrap();
        assert_eq!(
            reloaded.last_known_user_id().await.as_deref(),
            Some("user-1")
        );
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let db = Database::in_memory().await.unwrap();
        let manager = ContextManager::new(db.pool.clone());
        let mut rx = manager.subscribe();

        manager.set("user-1", "acct-1").await.unwrap();
        manager.clear().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.user_id.as_deref(), Some("user-1"));

        let second = rx.recv().await.unwrap();
        assert!(second.user_id.is_none());
    }
}
