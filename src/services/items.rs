// services/items.rs - Item flows entering the sync engine

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::require_identity;
use crate::context::ContextManager;
use crate::db::entity_queries::{self, WriteSource};
use crate::models::Item;
use crate::queue::{OperationKind, OperationMetadata, OperationQueue};
use crate::{Error, Result};

/// Caller-facing shape for creating an item
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub purchase_price: Option<f64>,
    pub notes: Option<String>,
    pub space: Option<String>,
    pub origin_transaction_id: Option<String>,
}

/// Writes an optimistic record, then queues the server write, in that
/// order; the call returns synchronously with the optimistic row
pub struct ItemService {
    pool: SqlitePool,
    context: Arc<ContextManager>,
    queue: Arc<OperationQueue>,
}

impl ItemService {
    pub fn new(pool: SqlitePool, context: Arc<ContextManager>, queue: Arc<OperationQueue>) -> Self {
        Self {
            pool,
            context,
            queue,
        }
    }

    pub async fn create_item(&self, new_item: NewItem) -> Result<Item> {
        let (user_id, account_id, _) = require_identity(&self.context).await?;
        let now = Utc::now();

        let item = Item {
            item_id: Uuid::new_v4().to_string(),
            account_id,
            qr_key: None,
            created_by: Some(user_id),
            date_created: now,
            origin_transaction_id: new_item.origin_transaction_id,
            name: new_item.name,
            description: new_item.description,
            source: new_item.source,
            sku: new_item.sku,
            price: new_item.price,
            purchase_price: new_item.purchase_price,
            project_price: None,
            market_value: None,
            payment_method: None,
            disposition: None,
            notes: new_item.notes,
            space: new_item.space,
            tax_rate_pct: None,
            tax_amount_purchase_price: None,
            tax_amount_project_price: None,
            bookmark: false,
            inventory_status: None,
            business_inventory_location: None,
            project_id: new_item.project_id,
            transaction_id: None,
            latest_transaction_id: None,
            primary_image_url: None,
            version: 1,
            last_updated: now,
            last_synced_at: None,
        };

        // Local commit first: a crash before the enqueue leaves a
        // reconcilable record, never a queued ghost.
        entity_queries::save_item(&self.pool, &item, WriteSource::LocalEdit).await?;

        self.queue
            .add(OperationKind::CreateItem { item: item.clone() }, None)
            .await?;

        Ok(item)
    }

    pub async fn update_item(&self, mut item: Item) -> Result<Item> {
        item.last_updated = Utc::now();

        entity_queries::save_item(&self.pool, &item, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                OperationKind::UpdateItem { item: item.clone() },
                Some(OperationMetadata {
                    version: Some(item.version + 1),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(item)
    }

    /// Queue a logical delete. The local row is removed only after the
    /// server confirms.
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let item = self.require_item(item_id).await?;

        self.queue
            .add(
                OperationKind::DeleteItem {
                    item_id: item.item_id,
                    project_id: item.project_id,
                },
                None,
            )
            .await?;

        Ok(())
    }

    pub async fn assign_to_transaction(&self, item_id: &str, transaction_id: &str) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        item.transaction_id = Some(transaction_id.to_string());
        item.latest_transaction_id = Some(transaction_id.to_string());

        self.save_and_enqueue(
            item,
            |item_id| OperationKind::AssignItemToTransaction {
                item_id,
                transaction_id: transaction_id.to_string(),
            },
        )
        .await
    }

    pub async fn unlink_from_transaction(
        &self,
        item_id: &str,
        transaction_id: &str,
    ) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        if item.transaction_id.as_deref() == Some(transaction_id) {
            item.transaction_id = None;
        }

        self.save_and_enqueue(
            item,
            |item_id| OperationKind::UnlinkItemFromTransaction {
                item_id,
                transaction_id: transaction_id.to_string(),
            },
        )
        .await
    }

    pub async fn allocate_to_project(&self, item_id: &str, project_id: &str) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        item.project_id = Some(project_id.to_string());
        item.inventory_status = Some("allocated".to_string());

        self.save_and_enqueue(
            item,
            |item_id| OperationKind::AllocateItemToProject {
                item_id,
                project_id: project_id.to_string(),
            },
        )
        .await
    }

    pub async fn deallocate_item(&self, item_id: &str) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        item.project_id = None;
        item.inventory_status = Some("available".to_string());

        self.save_and_enqueue(item, |item_id| OperationKind::DeallocateItem { item_id })
            .await
    }

    pub async fn move_to_business_inventory(&self, item_id: &str) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        item.project_id = None;
        item.inventory_status = Some("business_inventory".to_string());

        self.save_and_enqueue(item, |item_id| OperationKind::MoveItemToBusinessInventory {
            item_id,
        })
        .await
    }

    pub async fn sell_to_project(
        &self,
        item_id: &str,
        project_id: &str,
        sale_price: Option<f64>,
    ) -> Result<Item> {
        let mut item = self.require_item(item_id).await?;
        item.project_id = Some(project_id.to_string());
        item.disposition = Some("sold".to_string());
        if sale_price.is_some() {
            item.project_price = sale_price;
        }

        self.save_and_enqueue(
            item,
            |item_id| OperationKind::SellItemToProject {
                item_id,
                project_id: project_id.to_string(),
                sale_price,
            },
        )
        .await
    }

    async fn require_item(&self, item_id: &str) -> Result<Item> {
        entity_queries::get_item(&self.pool, item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item {}", item_id)))
    }

    async fn save_and_enqueue(
        &self,
        mut item: Item,
        kind: impl FnOnce(String) -> OperationKind,
    ) -> Result<Item> {
        item.last_updated = Utc::now();

        entity_queries::save_item(&self.pool, &item, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                kind(item.item_id.clone()),
                Some(OperationMetadata {
                    version: Some(item.version + 1),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(item)
    }
}
