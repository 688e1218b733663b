// db/entity_queries.rs - Typed queries for items, transactions and projects

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

use crate::models::{Item, Project, Transaction, TransactionStatus};
use crate::{Error, Result};

/// Who produced the row being written.
///
/// Only a server round-trip is allowed to stamp `last_synced_at`; local
/// optimistic writes keep whatever the payload carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    LocalEdit,
    ServerSync,
}

fn synced_stamp(source: WriteSource, existing: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match source {
        WriteSource::ServerSync => Some(Utc::now()),
        WriteSource::LocalEdit => existing,
    }
}

// ============================================================================
// Item Queries
// ============================================================================

/// Insert or replace an item row
pub async fn save_item(pool: &SqlitePool, item: &Item, source: WriteSource) -> Result<()> {
    upsert_item(pool, item, source).await
}

/// Save a batch of items inside a single store transaction
pub async fn save_items(pool: &SqlitePool, items: &[Item], source: WriteSource) -> Result<()> {
    let mut tx = pool.begin().await?;
    for item in items {
        upsert_item(&mut *tx, item, source).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn upsert_item<'e, E>(executor: E, item: &Item, source: WriteSource) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO items (
            item_id, account_id, qr_key, created_by, date_created,
            origin_transaction_id, name, description, source, sku,
            price, purchase_price, project_price, market_value,
            payment_method, disposition, notes, space, tax_rate_pct,
            tax_amount_purchase_price, tax_amount_project_price, bookmark,
            inventory_status, business_inventory_location, project_id,
            transaction_id, latest_transaction_id, primary_image_url,
            version, last_updated, last_synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.item_id)
    .bind(&item.account_id)
    .bind(&item.qr_key)
    .bind(&item.created_by)
    .bind(item.date_created)
    .bind(&item.origin_transaction_id)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.source)
    .bind(&item.sku)
    .bind(item.price)
    .bind(item.purchase_price)
    .bind(item.project_price)
    .bind(item.market_value)
    .bind(&item.payment_method)
    .bind(&item.disposition)
    .bind(&item.notes)
    .bind(&item.space)
    .bind(item.tax_rate_pct)
    .bind(item.tax_amount_purchase_price)
    .bind(item.tax_amount_project_price)
    .bind(item.bookmark)
    .bind(&item.inventory_status)
    .bind(&item.business_inventory_location)
    .bind(&item.project_id)
    .bind(&item.transaction_id)
    .bind(&item.latest_transaction_id)
    .bind(&item.primary_image_url)
    .bind(item.version.max(1))
    .bind(item.last_updated)
    .bind(synced_stamp(source, item.last_synced_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Get item by business key
pub async fn get_item(pool: &SqlitePool, item_id: &str) -> Result<Option<Item>> {
    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE item_id = ?")
        .bind(item_id)
        .fetch_optional(pool)
        .await?;

    Ok(item)
}

pub async fn items_by_project(pool: &SqlitePool, project_id: &str) -> Result<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>(
        "SELECT * FROM items WHERE project_id = ? ORDER BY last_updated DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn items_by_account(pool: &SqlitePool, account_id: &str) -> Result<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>(
        "SELECT * FROM items WHERE account_id = ? ORDER BY last_updated DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Remove an item row (after a delete operation succeeded on the server)
pub async fn delete_item(pool: &SqlitePool, item_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM items WHERE item_id = ?")
        .bind(item_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Replace the full item set of a project in one store transaction
pub async fn replace_project_items(
    pool: &SqlitePool,
    project_id: &str,
    items: &[Item],
    source: WriteSource,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM items WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    for item in items {
        upsert_item(&mut *tx, item, source).await?;
    }

    tx.commit().await?;
    Ok(())
}

// ============================================================================
// Transaction Queries
// ============================================================================

/// Transaction row as stored; `item_ids` is a JSON array column
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    account_id: String,
    project_id: Option<String>,
    created_by: Option<String>,
    transaction_date: DateTime<Utc>,
    amount: f64,
    allocated_amount: Option<f64>,
    category_id: Option<String>,
    tax_rate_preset: Option<String>,
    tax_rate_pct: Option<f64>,
    subtotal: Option<f64>,
    status: String,
    notes: Option<String>,
    item_ids: String,
    needs_review: bool,
    sum_item_purchase_prices: Option<f64>,
    reimbursement_type: Option<String>,
    trigger_event: Option<String>,
    version: i64,
    last_updated: DateTime<Utc>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_model(self) -> Result<Transaction> {
        let status = TransactionStatus::parse(&self.status).ok_or_else(|| {
            Error::Serialization(format!("Unknown transaction status: {}", self.status))
        })?;
        let item_ids: Vec<String> = serde_json::from_str(&self.item_ids)?;

        Ok(Transaction {
            transaction_id: self.transaction_id,
            account_id: self.account_id,
            project_id: self.project_id,
            created_by: self.created_by,
            transaction_date: self.transaction_date,
            amount: self.amount,
            allocated_amount: self.allocated_amount,
            category_id: self.category_id,
            tax_rate_preset: self.tax_rate_preset,
            tax_rate_pct: self.tax_rate_pct,
            subtotal: self.subtotal,
            status,
            notes: self.notes,
            item_ids,
            needs_review: self.needs_review,
            sum_item_purchase_prices: self.sum_item_purchase_prices,
            reimbursement_type: self.reimbursement_type,
            trigger_event: self.trigger_event,
            version: self.version,
            last_updated: self.last_updated,
            last_synced_at: self.last_synced_at,
        })
    }
}

pub async fn save_transaction(
    pool: &SqlitePool,
    transaction: &Transaction,
    source: WriteSource,
) -> Result<()> {
    let item_ids = serde_json::to_string(&transaction.item_ids)?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO transactions (
            transaction_id, account_id, project_id, created_by,
            transaction_date, amount, allocated_amount, category_id,
            tax_rate_preset, tax_rate_pct, subtotal, status, notes,
            item_ids, needs_review, sum_item_purchase_prices,
            reimbursement_type, trigger_event, version, last_updated,
            last_synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&transaction.transaction_id)
    .bind(&transaction.account_id)
    .bind(&transaction.project_id)
    .bind(&transaction.created_by)
    .bind(transaction.transaction_date)
    .bind(transaction.amount)
    .bind(transaction.allocated_amount)
    .bind(&transaction.category_id)
    .bind(&transaction.tax_rate_preset)
    .bind(transaction.tax_rate_pct)
    .bind(transaction.subtotal)
    .bind(transaction.status.as_str())
    .bind(&transaction.notes)
    .bind(item_ids)
    .bind(transaction.needs_review)
    .bind(transaction.sum_item_purchase_prices)
    .bind(&transaction.reimbursement_type)
    .bind(&transaction.trigger_event)
    .bind(transaction.version.max(1))
    .bind(transaction.last_updated)
    .bind(synced_stamp(source, transaction.last_synced_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_transaction(
    pool: &SqlitePool,
    transaction_id: &str,
) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE transaction_id = ?",
    )
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;

    row.map(TransactionRow::into_model).transpose()
}

pub async fn transactions_by_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE project_id = ? ORDER BY transaction_date DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TransactionRow::into_model).collect()
}

/// Business-inventory transactions: account-scoped rows with no project
pub async fn business_transactions_by_account(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE account_id = ? AND project_id IS NULL
        ORDER BY transaction_date DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TransactionRow::into_model).collect()
}

pub async fn delete_transaction(pool: &SqlitePool, transaction_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM transactions WHERE transaction_id = ?")
        .bind(transaction_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// Project Queries
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    account_id: String,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    name: String,
    description: Option<String>,
    budget: Option<f64>,
    design_fee: Option<f64>,
    default_category_id: Option<String>,
    status: Option<String>,
    settings: String,
    budget_categories: String,
    version: i64,
    last_updated: DateTime<Utc>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl ProjectRow {
    fn into_model(self) -> Result<Project> {
        Ok(Project {
            id: self.id,
            account_id: self.account_id,
            created_by: self.created_by,
            created_at: self.created_at,
            name: self.name,
            description: self.description,
            budget: self.budget,
            design_fee: self.design_fee,
            default_category_id: self.default_category_id,
            status: self.status,
            settings: serde_json::from_str(&self.settings)?,
            budget_categories: serde_json::from_str(&self.budget_categories)?,
            version: self.version,
            last_updated: self.last_updated,
            last_synced_at: self.last_synced_at,
        })
    }
}

pub async fn save_project(
    pool: &SqlitePool,
    project: &Project,
    source: WriteSource,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO projects (
            id, account_id, created_by, created_at, name, description,
            budget, design_fee, default_category_id, status, settings,
            budget_categories, version, last_updated, last_synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&project.id)
    .bind(&project.account_id)
    .bind(&project.created_by)
    .bind(project.created_at)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.budget)
    .bind(project.design_fee)
    .bind(&project.default_category_id)
    .bind(&project.status)
    .bind(serde_json::to_string(&project.settings)?)
    .bind(serde_json::to_string(&project.budget_categories)?)
    .bind(project.version.max(1))
    .bind(project.last_updated)
    .bind(synced_stamp(source, project.last_synced_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_project(pool: &SqlitePool, id: &str) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(ProjectRow::into_model).transpose()
}

pub async fn projects_by_account(pool: &SqlitePool, account_id: &str) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        "SELECT * FROM projects WHERE account_id = ? ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProjectRow::into_model).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::testutil::sample_item;

    #[tokio::test]
    async fn optimistic_write_does_not_stamp_last_synced_at() {
        let db = Database::in_memory().await.unwrap();
        let item = sample_item("item-1", "acct-1");

        save_item(&db.pool, &item, WriteSource::LocalEdit).await.unwrap();

        let stored = get_item(&db.pool, "item-1").await.unwrap().unwrap();
        assert!(stored.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn server_write_stamps_last_synced_at() {
        let db = Database::in_memory().await.unwrap();
        let item = sample_item("item-1", "acct-1");

        save_item(&db.pool, &item, WriteSource::ServerSync).await.unwrap();

        let stored = get_item(&db.pool, "item-1").await.unwrap().unwrap();
        let synced = stored.last_synced_at.expect("should be stamped");
        assert!(synced >= stored.last_updated);
    }

    #[tokio::test]
    async fn replace_project_items_is_atomic_snapshot() {
        let db = Database::in_memory().await.unwrap();

        let mut a = sample_item("item-a", "acct-1");
        a.project_id = Some("proj-1".to_string());
        save_item(&db.pool, &a, WriteSource::LocalEdit).await.unwrap();

        let mut b = sample_item("item-b", "acct-1");
        b.project_id = Some("proj-1".to_string());
        let mut c = sample_item("item-c", "acct-1");
        c.project_id = Some("proj-1".to_string());

        replace_project_items(&db.pool, "proj-1", &[b, c], WriteSource::ServerSync)
            .await
            .unwrap();

        let items = items_by_project(&db.pool, "proj-1").await.unwrap();
        let mut ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["item-b", "item-c"]);
    }

    #[tokio::test]
    async fn transaction_round_trips_item_ids_and_status() {
        let db = Database::in_memory().await.unwrap();
        let tx = crate::testutil::sample_transaction("tx-1", "acct-1", Some("proj-1"));

        save_transaction(&db.pool, &tx, WriteSource::LocalEdit).await.unwrap();

        let stored = get_transaction(&db.pool, "tx-1").await.unwrap().unwrap();
        assert_eq!(stored.item_ids, tx.item_ids);
        assert_eq!(stored.status, tx.status);
        assert!(stored.last_synced_at.is_none());
    }
}
