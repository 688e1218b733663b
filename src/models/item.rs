// models/item.rs - Inventory item entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sync_state, SyncState};

/// User-visible inventory record
///
/// Identity is the business key `item_id`, stable across clients. The
/// immutable block is written once at creation; the mutable block is what
/// conflict detection compares; relational ids move via explicit assignment
/// operations and are never field-diffed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    // Immutable
    pub item_id: String,
    pub account_id: String,
    pub qr_key: Option<String>,
    pub created_by: Option<String>,
    pub date_created: DateTime<Utc>,
    pub origin_transaction_id: Option<String>,

    // Mutable, conflict-compared
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
    pub bookmark: bool,
    pub inventory_status: Option<String>,
    pub business_inventory_location: Option<String>,

    // Relational, moved via assignment operations
    pub project_id: Option<String>,
    pub transaction_id: Option<String>,
    pub latest_transaction_id: Option<String>,

    /// Primary image; holds an `offline://{media_id}` sentinel until the
    /// media upload queue swaps in the server URL.
    pub primary_image_url: Option<String>,

    // Engine-managed
    pub version: i64,
    pub last_updated: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn sync_state(&self) -> SyncState {
        sync_state(self.last_synced_at, self.last_updated)
    }
}
