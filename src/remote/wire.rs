// remote/wire.rs - Server row shapes and the aligners onto local models
//
// The server names its modification column `updated_at` and knows nothing
// about `last_synced_at`. Every casing/naming difference is confined to
// this module so the rest of the engine compares like with like.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Item, Project, Transaction, TransactionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub account_id: String,
    pub qr_key: Option<String>,
    pub created_by: Option<String>,
    pub date_created: DateTime<Utc>,
    pub origin_transaction_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub purchase_price: Option<f64>,
    pub project_price: Option<f64>,
    pub market_value: Option<f64>,
    pub payment_method: Option<String>,
    pub disposition: Option<String>,
    pub notes: Option<String>,
    pub space: Option<String>,
    pub tax_rate_pct: Option<f64>,
    pub tax_amount_purchase_price: Option<f64>,
    pub tax_amount_project_price: Option<f64>,
    #[serde(default)]
    pub bookmark: bool,
    pub inventory_status: Option<String>,
    pub business_inventory_location: Option<String>,
    pub project_id: Option<String>,
    pub transaction_id: Option<String>,
    pub latest_transaction_id: Option<String>,
    pub primary_image_url: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Align a server item row onto the local model. `last_synced_at` is left
/// unset; only the store stamps it, and only on authoritative writes.
pub fn align_item(record: ItemRecord) -> Item {
    Item {
        item_id: record.item_id,
        account_id: record.account_id,
        qr_key: record.qr_key,
        created_by: record.created_by,
        date_created: record.date_created,
        origin_transaction_id: record.origin_transaction_id,
        name: record.name,
        description: record.description,
        source: record.source,
        sku: record.sku,
        price: record.price,
        purchase_price: record.purchase_price,
        project_price: record.project_price,
        market_value: record.market_value,
        payment_method: record.payment_method,
        disposition: record.disposition,
        notes: record.notes,
        space: record.space,
        tax_rate_pct: record.tax_rate_pct,
        tax_amount_purchase_price: record.tax_amount_purchase_price,
        tax_amount_project_price: record.tax_amount_project_price,
        bookmark: record.bookmark,
        inventory_status: record.inventory_status,
        business_inventory_location: record.business_inventory_location,
        project_id: record.project_id,
        transaction_id: record.transaction_id,
        latest_transaction_id: record.latest_transaction_id,
        primary_image_url: record.primary_image_url,
        version: record.version,
        last_updated: record.updated_at,
        last_synced_at: None,
    }
}

pub fn item_to_wire(item: &Item) -> ItemRecord {
    ItemRecord {
        item_id: item.item_id.clone(),
        account_id: item.account_id.clone(),
        qr_key: item.qr_key.clone(),
        created_by: item.created_by.clone(),
        date_created: item.date_created,
        origin_transaction_id: item.origin_transaction_id.clone(),
        name: item.name.clone(),
        description: item.description.clone(),
        source: item.source.clone(),
        sku: item.sku.clone(),
        price: item.price,
        purchase_price: item.purchase_price,
        project_price: item.project_price,
        market_value: item.market_value,
        payment_method: item.payment_method.clone(),
        disposition: item.disposition.clone(),
        notes: item.notes.clone(),
        space: item.space.clone(),
        tax_rate_pct: item.tax_rate_pct,
        tax_amount_purchase_price: item.tax_amount_purchase_price,
        tax_amount_project_price: item.tax_amount_project_price,
        bookmark: item.bookmark,
        inventory_status: item.inventory_status.clone(),
        business_inventory_location: item.business_inventory_location.clone(),
        project_id: item.project_id.clone(),
        transaction_id: item.transaction_id.clone(),
        latest_transaction_id: item.latest_transaction_id.clone(),
        primary_image_url: item.primary_image_url.clone(),
        version: item.version,
        updated_at: item.last_updated,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub account_id: String,
    pub project_id: Option<String>,
    pub created_by: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub amount: f64,
    pub allocated_amount: Option<f64>,
    pub category_id: Option<String>,
    pub tax_rate_preset: Option<String>,
    pub tax_rate_pct: Option<f64>,
    pub subtotal: Option<f64>,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub needs_review: bool,
    pub sum_item_purchase_prices: Option<f64>,
    pub reimbursement_type: Option<String>,
    pub trigger_event: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

pub fn align_transaction(record: TransactionRecord) -> Transaction {
    Transaction {
        transaction_id: record.transaction_id,
        account_id: record.account_id,
        project_id: record.project_id,
        created_by: record.created_by,
        transaction_date: record.transaction_date,
        amount: record.amount,
        allocated_amount: record.allocated_amount,
        category_id: record.category_id,
        tax_rate_preset: record.tax_rate_preset,
        tax_rate_pct: record.tax_rate_pct,
        subtotal: record.subtotal,
        status: record.status,
        notes: record.notes,
        item_ids: record.item_ids,
        needs_review: record.needs_review,
        sum_item_purchase_prices: record.sum_item_purchase_prices,
        reimbursement_type: record.reimbursement_type,
        trigger_event: record.trigger_event,
        version: record.version,
        last_updated: record.updated_at,
        last_synced_at: None,
    }
}

pub fn transaction_to_wire(transaction: &Transaction) -> TransactionRecord {
    TransactionRecord {
        transaction_id: transaction.transaction_id.clone(),
        account_id: transaction.account_id.clone(),
        project_id: transaction.project_id.clone(),
        created_by: transaction.created_by.clone(),
        transaction_date: transaction.transaction_date,
        amount: transaction.amount,
        allocated_amount: transaction.allocated_amount,
        category_id: transaction.category_id.clone(),
        tax_rate_preset: transaction.tax_rate_preset.clone(),
        tax_rate_pct: transaction.tax_rate_pct,
        subtotal: transaction.subtotal,
        status: transaction.status,
        notes: transaction.notes.clone(),
        item_ids: transaction.item_ids.clone(),
        needs_review: transaction.needs_review,
        sum_item_purchase_prices: transaction.sum_item_purchase_prices,
        reimbursement_type: transaction.reimbursement_type.clone(),
        trigger_event: transaction.trigger_event.clone(),
        version: transaction.version,
        updated_at: transaction.last_updated,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub account_id: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub design_fee: Option<f64>,
    pub default_category_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub budget_categories: serde_json::Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

pub fn align_project(record: ProjectRecord) -> Project {
    Project {
        id: record.id,
        account_id: record.account_id,
        created_by: record.created_by,
        created_at: record.created_at,
        name: record.name,
        description: record.description,
        budget: record.budget,
        design_fee: record.design_fee,
        default_category_id: record.default_category_id,
        status: record.status,
        settings: record.settings,
        budget_categories: record.budget_categories,
        version: record.version,
        last_updated: record.updated_at,
        last_synced_at: None,
    }
}

pub fn project_to_wire(project: &Project) -> ProjectRecord {
    ProjectRecord {
        id: project.id.clone(),
        account_id: project.account_id.clone(),
        created_by: project.created_by.clone(),
        created_at: project.created_at,
        name: project.name.clone(),
        description: project.description.clone(),
        budget: project.budget,
        design_fee: project.design_fee,
        default_category_id: project.default_category_id.clone(),
        status: project.status.clone(),
        settings: project.settings.clone(),
        budget_categories: project.budget_categories.clone(),
        version: project.version,
        updated_at: project.last_updated,
    }
}
