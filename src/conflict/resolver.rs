// conflict/resolver.rs - Applying a resolution strategy to a stored conflict

use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::{Conflict, Resolution};
use crate::db::entity_queries::{self, WriteSource};
use crate::models::{EntityType, Item, Project, Transaction};
use crate::queue::{OperationKind, OperationMetadata, OperationQueue};
use crate::{Error, Result};

/// How to settle a conflict
#[derive(Debug, Clone)]
pub enum ResolutionStrategy {
    /// Re-enqueue an update with the local data; the server accepts or
    /// re-conflicts on the next drain.
    KeepLocal,
    /// Overwrite the local row with the server data.
    KeepServer,
    /// Persist a caller-supplied field-wise merged record, then enqueue
    /// it like a local edit.
    Merge(Value),
    /// Leave both sides intact; the conflict stays open.
    Manual,
}

/// Strategy the drain applies to conflicts it records itself: always
/// surface to the UI rather than guessing. Pure timestamp divergence with
/// identical content never reaches this point (the detector suppresses
/// it).
pub fn auto_strategy(_conflict: &Conflict) -> ResolutionStrategy {
    ResolutionStrategy::Manual
}

pub struct ConflictResolver {
    pool: SqlitePool,
    queue: Arc<OperationQueue>,
}

impl ConflictResolver {
    pub fn new(pool: SqlitePool, queue: Arc<OperationQueue>) -> Self {
        Self { pool, queue }
    }

    /// Apply a strategy to a conflict. Resolved conflicts stay in storage
    /// for audit but no longer gate queued operations.
    pub async fn resolve(&self, conflict: &Conflict, strategy: ResolutionStrategy) -> Result<()> {
        match strategy {
            ResolutionStrategy::KeepLocal => {
                crate::db::conflict_queries::mark_resolved(
                    &self.pool,
                    &conflict.fingerprint,
                    Resolution::Local,
                )
                .await?;
                self.enqueue_update(conflict, conflict.local.data.clone(), conflict.local.version)
                    .await?;
                tracing::info!("Conflict {} resolved keeping local", conflict.fingerprint);
            }
            ResolutionStrategy::KeepServer => {
                self.write_authoritative(conflict, conflict.server.data.clone())
                    .await?;
                crate::db::conflict_queries::mark_resolved(
                    &self.pool,
                    &conflict.fingerprint,
                    Resolution::Server,
                )
                .await?;
                tracing::info!("Conflict {} resolved keeping server", conflict.fingerprint);
            }
            ResolutionStrategy::Merge(merged) => {
                self.write_local(conflict, merged.clone()).await?;
                crate::db::conflict_queries::mark_resolved(
                    &self.pool,
                    &conflict.fingerprint,
                    Resolution::Merge,
                )
                .await?;
                self.enqueue_update(conflict, merged, conflict.local.version)
                    .await?;
                tracing::info!("Conflict {} resolved by merge", conflict.fingerprint);
            }
            ResolutionStrategy::Manual => {
                // Both sides stay; the conflict remains open for the UI.
            }
        }

        Ok(())
    }

    async fn enqueue_update(&self, conflict: &Conflict, data: Value, version: i64) -> Result<()> {
        let kind = match conflict.entity_type {
            EntityType::Item => OperationKind::UpdateItem {
                item: from_value::<Item>(data)?,
            },
            EntityType::Transaction => OperationKind::UpdateTransaction {
                transaction: from_value::<Transaction>(data)?,
            },
            EntityType::Project => OperationKind::UpdateProject {
                project: from_value::<Project>(data)?,
            },
        };

        self.queue
            .add(
                kind,
                Some(OperationMetadata {
                    account_id: Some(conflict.account_id.clone()),
                    version: Some(version),
                    timestamp: None,
                }),
            )
            .await?;

        Ok(())
    }

    async fn write_authoritative(&self, conflict: &Conflict, data: Value) -> Result<()> {
        match conflict.entity_type {
            EntityType::Item => {
                let item = from_value::<Item>(data)?;
                entity_queries::save_item(&self.pool, &item, WriteSource::ServerSync).await
            }
            EntityType::Transaction => {
                let transaction = from_value::<Transaction>(data)?;
                entity_queries::save_transaction(&self.pool, &transaction, WriteSource::ServerSync)
                    .await
            }
            EntityType::Project => {
                let project = from_value::<Project>(data)?;
                entity_queries::save_project(&self.pool, &project, WriteSource::ServerSync).await
            }
        }
    }

    async fn write_local(&self, conflict: &Conflict, data: Value) -> Result<()> {
        match conflict.entity_type {
            EntityType::Item => {
                let mut item = from_value::<Item>(data)?;
                item.last_updated = chrono::Utc::now();
                item.version = conflict.local.version;
                entity_queries::save_item(&self.pool, &item, WriteSource::LocalEdit).await
            }
            EntityType::Transaction => {
                let mut transaction = from_value::<Transaction>(data)?;
                transaction.last_updated = chrono::Utc::now();
                transaction.version = conflict.local.version;
                entity_queries::save_transaction(&self.pool, &transaction, WriteSource::LocalEdit)
                    .await
            }
            EntityType::Project => {
                let mut project = from_value::<Project>(data)?;
                project.last_updated = chrono::Utc::now();
                project.version = conflict.local.version;
                entity_queries::save_project(&self.pool, &project, WriteSource::LocalEdit).await
            }
        }
    }
}

fn from_value<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| Error::Serialization(format!("Malformed conflict payload: {}", e)))
}
