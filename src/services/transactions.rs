// services/transactions.rs - Transaction flows entering the sync engine

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::require_identity;
use crate::context::ContextManager;
use crate::db::entity_queries::{self, WriteSource};
use crate::models::{Transaction, TransactionStatus};
use crate::queue::{OperationKind, OperationMetadata, OperationQueue};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// None binds the transaction to business inventory.
    pub project_id: Option<String>,
    pub amount: f64,
    pub category_id: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub item_ids: Vec<String>,
}

pub struct TransactionService {
    pool: SqlitePool,
    context: Arc<ContextManager>,
    queue: Arc<OperationQueue>,
}

impl TransactionService {
    pub fn new(pool: SqlitePool, context: Arc<ContextManager>, queue: Arc<OperationQueue>) -> Self {
        Self {
            pool,
            context,
            queue,
        }
    }

    pub async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        let (user_id, account_id, _) = require_identity(&self.context).await?;
        let now = Utc::now();

        let transaction = Transaction {
            transaction_id: Uuid::new_v4().to_string(),
            account_id,
            project_id: new_transaction.project_id,
            created_by: Some(user_id),
            transaction_date: new_transaction.transaction_date.unwrap_or(now),
            amount: new_transaction.amount,
            allocated_amount: None,
            category_id: new_transaction.category_id,
            tax_rate_preset: None,
            tax_rate_pct: None,
            subtotal: None,
            status: TransactionStatus::Pending,
            notes: new_transaction.notes,
            item_ids: new_transaction.item_ids,
            needs_review: false,
            sum_item_purchase_prices: None,
            reimbursement_type: None,
            trigger_event: None,
            version: 1,
            last_updated: now,
            last_synced_at: None,
        };

        // Optimistic commit precedes the enqueue
        entity_queries::save_transaction(&self.pool, &transaction, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                OperationKind::CreateTransaction {
                    transaction: transaction.clone(),
                },
                None,
            )
            .await?;

        Ok(transaction)
    }

    pub async fn update_transaction(&self, mut transaction: Transaction) -> Result<Transaction> {
        transaction.last_updated = Utc::now();

        entity_queries::save_transaction(&self.pool, &transaction, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                OperationKind::UpdateTransaction {
                    transaction: transaction.clone(),
                },
                Some(OperationMetadata {
                    version: Some(transaction.version + 1),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(transaction)
    }

    pub async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        let transaction = self.require_transaction(transaction_id).await?;

        self.queue
            .add(
                OperationKind::DeleteTransaction {
                    transaction_id: transaction.transaction_id,
                    project_id: transaction.project_id,
                },
                None,
            )
            .await?;

        Ok(())
    }

    /// Rebind a transaction to another project (or to business inventory
    /// with `None`)
    pub async fn move_to_project(
        &self,
        transaction_id: &str,
        project_id: Option<&str>,
    ) -> Result<Transaction> {
        let mut transaction = self.require_transaction(transaction_id).await?;
        transaction.project_id = project_id.map(str::to_string);
        transaction.last_updated = Utc::now();

        entity_queries::save_transaction(&self.pool, &transaction, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                OperationKind::MoveTransactionToProject {
                    transaction_id: transaction.transaction_id.clone(),
                    project_id: transaction.project_id.clone(),
                },
                Some(OperationMetadata {
                    version: Some(transaction.version + 1),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(transaction)
    }

    async fn require_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        entity_queries::get_transaction(&self.pool, transaction_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", transaction_id)))
    }
}
