// engine.rs - Engine wiring and the queue drain

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::conflict::{ConflictDetector, ConflictResolver};
use crate::context::ContextManager;
use crate::db::entity_queries::{self, WriteSource};
use crate::db::{media_queries, Database};
use crate::media::{MediaDrainReport, MediaStore, DEFAULT_QUOTA_BYTES};
use crate::metadata::MetadataCache;
use crate::models::EntityType;
use crate::network::{NetworkGate, DEFAULT_NETWORK_TIMEOUT};
use crate::queue::{Operation, OperationKind, OperationQueue};
use crate::remote::{RemoteStore, SessionProvider};
use crate::services::{ItemService, ProjectService, TransactionService};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub quota_bytes: i64,
    pub drain_interval: Duration,
    pub network_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_QUOTA_BYTES,
            drain_interval: Duration::from_secs(30),
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }
}

/// Outcome of one drain pass over the operation queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainReport {
    pub completed: u32,
    pub failed: u32,
    pub blocked: u32,
    pub conflicts: u32,
}

/// The sync engine: local store, ambient context, operation queue,
/// conflict detection/resolution, media and metadata caches, all behind
/// one network gate
pub struct SyncEngine {
    db: Arc<Database>,
    context: Arc<ContextManager>,
    gate: Arc<NetworkGate>,
    queue: Arc<OperationQueue>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    media: MediaStore,
    metadata: MetadataCache,
    remote: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionProvider>,
    drain_interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl SyncEngine {
    pub async fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        let db = Arc::new(db);
        let pool = db.pool.clone();

        let context = Arc::new(ContextManager::new(pool.clone()));
        context.init().await?;

        let gate = Arc::new(NetworkGate::new(config.network_timeout));

        let queue = Arc::new(OperationQueue::new(pool.clone(), context.clone()));
        queue.init().await?;

        let detector = ConflictDetector::new(pool.clone(), remote.clone(), gate.clone());
        let resolver = ConflictResolver::new(pool.clone(), queue.clone());
        let media = MediaStore::new(pool.clone(), config.quota_bytes);
        let metadata = MetadataCache::new(pool);

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            db,
            context,
            gate,
            queue,
            detector,
            resolver,
            media,
            metadata,
            remote,
            sessions,
            drain_interval: config.drain_interval,
            shutdown,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    pub fn gate(&self) -> &Arc<NetworkGate> {
        &self.gate
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn items(&self) -> ItemService {
        ItemService::new(self.db.pool.clone(), self.context.clone(), self.queue.clone())
    }

    pub fn transactions(&self) -> TransactionService {
        TransactionService::new(self.db.pool.clone(), self.context.clone(), self.queue.clone())
    }

    pub fn projects(&self) -> ProjectService {
        ProjectService::new(self.db.pool.clone(), self.queue.clone())
    }

    /// One drain pass: verify session, then push each account's due
    /// operations in order, one at a time per account
    pub async fn process_queue(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        if !self.gate.is_online() {
            tracing::debug!("Skipping drain: offline");
            return Ok(report);
        }

        self.ensure_fresh_session().await?;

        'accounts: for account_id in self.queue.accounts_with_pending().await? {
            for operation in self.queue.due_for_account(&account_id).await? {
                // Offline transition cancels the outer loop between
                // operations; the in-flight one has already settled.
                if !self.gate.is_online() {
                    tracing::info!("Drain cancelled: went offline");
                    break 'accounts;
                }

                // Conflict gate: updates, deletes and assignments wait
                // for an open conflict naming their entity.
                if !operation.kind.is_create()
                    && self
                        .detector
                        .has_blocking_conflict(
                            operation.kind.entity_type(),
                            operation.kind.entity_id(),
                        )
                        .await?
                {
                    self.queue.mark_blocked(&operation.id).await?;
                    report.blocked += 1;
                    continue;
                }

                match self.execute(&operation).await {
                    Ok(()) => {
                        self.queue.mark_completed(&operation.id).await?;
                        report.completed += 1;
                    }
                    Err(Error::Conflict(message)) => {
                        tracing::warn!(
                            "Server rejected operation {} as stale: {}",
                            operation.id,
                            message
                        );
                        self.record_drain_conflict(&operation).await?;
                        report.conflicts += 1;
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!("Operation {} failed: {}", operation.id, e);
                        self.queue.mark_failed(&operation.id, "Sync failed").await?;
                        report.failed += 1;
                    }
                    // Identity and programmer errors abort the pass
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(report)
    }

    /// Drain the media upload queue for one account
    pub async fn process_media_queue(&self, account_id: &str) -> Result<MediaDrainReport> {
        self.media
            .process_queued_uploads(self.remote.as_ref(), &self.gate, account_id)
            .await
    }

    /// Background driver: a timer plus online transitions wake the drain;
    /// `shutdown` stops it between operations
    pub fn start_drain_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut online_rx = engine.gate.watch_online();
        let mut shutdown_rx = engine.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.drain_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => {}
                }

                if *shutdown_rx.borrow() {
                    tracing::info!("Drain loop stopped");
                    break;
                }
                if !engine.gate.is_online() {
                    continue;
                }

                if let Err(e) = engine.process_queue().await {
                    tracing::warn!("Drain pass failed: {}", e);
                }

                match media_queries::accounts_with_uploads(&engine.db.pool).await {
                    Ok(accounts) => {
                        for account_id in accounts {
                            if let Err(e) = engine.process_media_queue(&account_id).await {
                                tracing::warn!(
                                    "Media drain failed for account {}: {}",
                                    account_id,
                                    e
                                );
                            }
                        }
                    }
                    Err(e) => tracing::warn!("Media drain skipped: {}", e),
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Refresh the session when it is close to expiry and confirm the
    /// server still knows who we are
    async fn ensure_fresh_session(&self) -> Result<()> {
        let session = self.sessions.session().await?;
        if session.needs_refresh() {
            tracing::info!("Session near expiry, refreshing before drain");
            self.sessions.refresh_session().await?;
        }

        let user_id = self
            .gate
            .with_timeout(self.sessions.current_user_id())
            .await?;
        if user_id.is_none() {
            return Err(Error::Auth("No authenticated user for drain".to_string()));
        }

        Ok(())
    }

    /// Variant-specific handler: push to the server, write the canonical
    /// row back with an authoritative stamp
    async fn execute(&self, operation: &Operation) -> Result<()> {
        let pool = &self.db.pool;

        match &operation.kind {
            OperationKind::CreateItem { item } | OperationKind::UpdateItem { item } => {
                let canonical = self.gate.with_timeout(self.remote.upsert_item(item)).await?;
                entity_queries::save_item(pool, &canonical, WriteSource::ServerSync).await
            }
            OperationKind::DeleteItem { item_id, .. } => {
                self.gate
                    .with_timeout(self.remote.delete_item(item_id))
                    .await?;
                entity_queries::delete_item(pool, item_id).await
            }
            OperationKind::AssignItemToTransaction { item_id, .. }
            | OperationKind::UnlinkItemFromTransaction { item_id, .. }
            | OperationKind::AllocateItemToProject { item_id, .. }
            | OperationKind::DeallocateItem { item_id }
            | OperationKind::MoveItemToBusinessInventory { item_id }
            | OperationKind::SellItemToProject { item_id, .. } => {
                // Relational moves push the current local row
                let Some(item) = entity_queries::get_item(pool, item_id).await? else {
                    tracing::debug!("Item {} gone before assignment sync", item_id);
                    return Ok(());
                };
                let canonical = self
                    .gate
                    .with_timeout(self.remote.upsert_item(&item))
                    .await?;
                entity_queries::save_item(pool, &canonical, WriteSource::ServerSync).await
            }
            OperationKind::CreateTransaction { transaction }
            | OperationKind::UpdateTransaction { transaction } => {
                let canonical = self
                    .gate
                    .with_timeout(self.remote.upsert_transaction(transaction))
                    .await?;
                entity_queries::save_transaction(pool, &canonical, WriteSource::ServerSync).await
            }
            OperationKind::DeleteTransaction { transaction_id, .. } => {
                self.gate
                    .with_timeout(self.remote.delete_transaction(transaction_id))
                    .await?;
                entity_queries::delete_transaction(pool, transaction_id).await
            }
            OperationKind::MoveTransactionToProject { transaction_id, .. } => {
                let Some(transaction) = entity_queries::get_transaction(pool, transaction_id).await?
                else {
                    tracing::debug!("Transaction {} gone before move sync", transaction_id);
                    return Ok(());
                };
                let canonical = self
                    .gate
                    .with_timeout(self.remote.upsert_transaction(&transaction))
                    .await?;
                entity_queries::save_transaction(pool, &canonical, WriteSource::ServerSync).await
            }
            OperationKind::UpdateProject { project } => {
                let canonical = self
                    .gate
                    .with_timeout(self.remote.upsert_project(project))
                    .await?;
                entity_queries::save_project(pool, &canonical, WriteSource::ServerSync).await
            }
        }
    }

    /// Capture local and server snapshots after an optimistic-concurrency
    /// rejection and store a version conflict. The operation stays queued
    /// behind the conflict gate.
    async fn record_drain_conflict(&self, operation: &Operation) -> Result<()> {
        let pool = &self.db.pool;
        let entity_id = operation.kind.entity_id();
        let account_id = &operation.account_id;

        match operation.kind.entity_type() {
            EntityType::Item => {
                let Some(local) = entity_queries::get_item(pool, entity_id).await? else {
                    return Ok(());
                };
                let scope = match &local.project_id {
                    Some(project_id) => {
                        self.gate
                            .with_timeout(self.remote.list_items_by_project(project_id))
                            .await?
                    }
                    None => {
                        self.gate
                            .with_timeout(self.remote.list_items_by_account(account_id))
                            .await?
                    }
                };
                if let Some(server) = scope.into_iter().find(|i| i.item_id == entity_id) {
                    self.detector
                        .record_version_conflict(account_id, &local, &server)
                        .await?;
                }
            }
            EntityType::Transaction => {
                let Some(local) = entity_queries::get_transaction(pool, entity_id).await? else {
                    return Ok(());
                };
                let scope = match &local.project_id {
                    Some(project_id) => {
                        self.gate
                            .with_timeout(self.remote.list_transactions_by_project(project_id))
                            .await?
                    }
                    None => {
                        self.gate
                            .with_timeout(self.remote.list_business_transactions(account_id))
                            .await?
                    }
                };
                if let Some(server) = scope.into_iter().find(|t| t.transaction_id == entity_id) {
                    self.detector
                        .record_version_conflict(account_id, &local, &server)
                        .await?;
                }
            }
            EntityType::Project => {
                let Some(local) = entity_queries::get_project(pool, entity_id).await? else {
                    return Ok(());
                };
                let scope = self
                    .gate
                    .with_timeout(self.remote.list_projects(account_id))
                    .await?;
                if let Some(server) = scope.into_iter().find(|p| p.id == entity_id) {
                    self.detector
                        .record_version_conflict(account_id, &local, &server)
                        .await?;
                }
            }
        }

        Ok(())
    }
}
