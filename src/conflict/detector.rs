// conflict/detector.rs - Local vs server snapshot comparison

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    fingerprint, first_differing_field, Conflict, ConflictSide, ConflictType, FieldAccessor,
    ITEM_FIELDS, PROJECT_FIELDS, TRANSACTION_FIELDS,
};
use crate::db::{conflict_queries, entity_queries};
use crate::models::{EntityType, Item, Project, Transaction};
use crate::network::NetworkGate;
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// A row stamped this recently is the engine seeing its own sync echo,
/// not a divergence
const JUST_SYNCED_WINDOW_SECS: i64 = 5;

/// Server must be newer by more than this before a timestamp divergence
/// counts, absorbing clock skew between client and server
const CLOCK_SKEW_ALLOWANCE_SECS: i64 = 10;

/// Entities the detector can compare along a mutable-field whitelist
pub trait Comparable: Serialize + Clone {
    const ENTITY_TYPE: EntityType;

    fn business_key(&self) -> &str;
    fn version(&self) -> i64;
    fn last_updated(&self) -> DateTime<Utc>;
    fn last_synced_at(&self) -> Option<DateTime<Utc>>;
    fn fields() -> &'static [FieldAccessor<Self>]
    where
        Self: Sized;
}

impl Comparable for Item {
    const ENTITY_TYPE: EntityType = EntityType::Item;

    fn business_key(&self) -> &str {
        &self.item_id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
    fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
    fn fields() -> &'static [FieldAccessor<Self>] {
        ITEM_FIELDS
    }
}

impl Comparable for Transaction {
    const ENTITY_TYPE: EntityType = EntityType::Transaction;

    fn business_key(&self) -> &str {
        &self.transaction_id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
    fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
    fn fields() -> &'static [FieldAccessor<Self>] {
        TRANSACTION_FIELDS
    }
}

impl Comparable for Project {
    const ENTITY_TYPE: EntityType = EntityType::Project;

    fn business_key(&self) -> &str {
        &self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
    fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
    fn fields() -> &'static [FieldAccessor<Self>] {
        PROJECT_FIELDS
    }
}

/// Compares scoped local and server snapshots and stores typed conflict
/// records under deterministic fingerprints
pub struct ConflictDetector {
    pool: SqlitePool,
    remote: Arc<dyn RemoteStore>,
    gate: Arc<NetworkGate>,
}

impl ConflictDetector {
    pub fn new(pool: SqlitePool, remote: Arc<dyn RemoteStore>, gate: Arc<NetworkGate>) -> Self {
        Self { pool, remote, gate }
    }

    /// Items of one project
    pub async fn detect_item_conflicts(
        &self,
        account_id: &str,
        project_id: &str,
    ) -> Result<Vec<Conflict>> {
        self.require_online()?;

        let local = entity_queries::items_by_project(&self.pool, project_id).await?;
        let server = self
            .gate
            .with_timeout(self.remote.list_items_by_project(project_id))
            .await?;

        self.detect_set(account_id, local, server).await
    }

    /// Transactions of one project, or the account's business-inventory
    /// transactions when no project is given
    pub async fn detect_transaction_conflicts(
        &self,
        account_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<Conflict>> {
        self.require_online()?;

        let (local, server) = match project_id {
            Some(project_id) => (
                entity_queries::transactions_by_project(&self.pool, project_id).await?,
                self.gate
                    .with_timeout(self.remote.list_transactions_by_project(project_id))
                    .await?,
            ),
            None => (
                entity_queries::business_transactions_by_account(&self.pool, account_id).await?,
                self.gate
                    .with_timeout(self.remote.list_business_transactions(account_id))
                    .await?,
            ),
        };

        self.detect_set(account_id, local, server).await
    }

    /// All projects of an account
    pub async fn detect_project_conflicts(&self, account_id: &str) -> Result<Vec<Conflict>> {
        self.require_online()?;

        let local = entity_queries::projects_by_account(&self.pool, account_id).await?;
        let server = self
            .gate
            .with_timeout(self.remote.list_projects(account_id))
            .await?;

        self.detect_set(account_id, local, server).await
    }

    /// Does a stored open conflict name this entity? Used by the drain to
    /// gate updates, deletes and assignments.
    pub async fn has_blocking_conflict(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<bool> {
        conflict_queries::has_open_for_entity(&self.pool, entity_type, entity_id).await
    }

    /// Record a server-side optimistic-concurrency rejection observed by
    /// the drain as a version conflict
    pub async fn record_version_conflict<T: Comparable>(
        &self,
        account_id: &str,
        local: &T,
        server: &T,
    ) -> Result<Conflict> {
        let conflict = build_conflict(account_id, local, server, ConflictType::Version, "version");
        conflict_queries::upsert_conflict(&self.pool, &conflict).await?;

        tracing::warn!(
            "Version conflict recorded for {} {}",
            T::ENTITY_TYPE.as_str(),
            local.business_key()
        );
        Ok(conflict)
    }

    fn require_online(&self) -> Result<()> {
        if self.gate.is_online() {
            Ok(())
        } else {
            Err(Error::Network(
                "Conflict detection requires the network gate to be online".to_string(),
            ))
        }
    }

    /// Shared comparison over one scope. Clears the scope's previous
    /// unresolved snapshot first so the stored set reflects this pass.
    async fn detect_set<T: Comparable + 'static>(
        &self,
        account_id: &str,
        local: Vec<T>,
        server: Vec<T>,
    ) -> Result<Vec<Conflict>> {
        conflict_queries::clear_unresolved_scope(&self.pool, T::ENTITY_TYPE, account_id).await?;

        let server_by_key: HashMap<&str, &T> = server
            .iter()
            .map(|row| (row.business_key(), row))
            .collect();

        let now = Utc::now();
        let mut conflicts = Vec::new();

        for local_row in &local {
            let Some(server_row) = server_by_key.get(local_row.business_key()) else {
                continue;
            };

            // Freshly stamped rows are our own write reflected back
            if let Some(synced) = local_row.last_synced_at() {
                if now - synced < Duration::seconds(JUST_SYNCED_WINDOW_SECS) {
                    continue;
                }
            }

            // Version or timestamp divergence with identical content is
            // not a user-visible conflict
            let Some(first_diff) =
                first_differing_field(local_row, *server_row, T::fields())
            else {
                continue;
            };

            let version_differs = local_row.version() != server_row.version();
            let time_differs = server_row.last_updated() - local_row.last_updated()
                > Duration::seconds(CLOCK_SKEW_ALLOWANCE_SECS);

            let (conflict_type, field) = if version_differs {
                (ConflictType::Version, "version")
            } else if time_differs {
                (ConflictType::Timestamp, "timestamp")
            } else {
                (ConflictType::Content, first_diff)
            };

            let conflict = build_conflict(account_id, local_row, *server_row, conflict_type, field);
            conflict_queries::upsert_conflict(&self.pool, &conflict).await?;
            conflicts.push(conflict);
        }

        if !conflicts.is_empty() {
            tracing::info!(
                "Detected {} {} conflict(s) for account {}",
                conflicts.len(),
                T::ENTITY_TYPE.as_str(),
                account_id
            );
        }

        Ok(conflicts)
    }
}

fn build_conflict<T: Comparable>(
    account_id: &str,
    local: &T,
    server: &T,
    conflict_type: ConflictType,
    field: &str,
) -> Conflict {
    Conflict {
        fingerprint: fingerprint(
            T::ENTITY_TYPE,
            account_id,
            local.business_key(),
            conflict_type,
            field,
        ),
        account_id: account_id.to_string(),
        entity_type: T::ENTITY_TYPE,
        entity_id: local.business_key().to_string(),
        conflict_type,
        field: field.to_string(),
        local: ConflictSide {
            data: serde_json::to_value(local).unwrap_or(serde_json::Value::Null),
            timestamp: local.last_updated(),
            version: local.version(),
        },
        server: ConflictSide {
            data: serde_json::to_value(server).unwrap_or(serde_json::Value::Null),
            timestamp: server.last_updated(),
            version: server.version(),
        },
        created_at: Utc::now(),
        resolved: false,
        resolution: None,
    }
}
