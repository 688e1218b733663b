// models/transaction.rs - Financial transaction entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sync_state, SyncState};

/// Financial event, bound to a project or to business inventory
/// (`project_id = None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub project_id: Option<String>,
    pub created_by: Option<String>,
    pub transaction_date: DateTime<Utc>,

    // Mutable, conflict-compared
    pub amount: f64,
    pub allocated_amount: Option<f64>,
    pub category_id: Option<String>,
    pub tax_rate_preset: Option<String>,
    pub tax_rate_pct: Option<f64>,
    pub subtotal: Option<f64>,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    /// Ordered item membership; opaque ids, never owned pointers.
    pub item_ids: Vec<String>,
    pub needs_review: bool,
    pub sum_item_purchase_prices: Option<f64>,
    pub reimbursement_type: Option<String>,
    pub trigger_event: Option<String>,

    // Engine-managed
    pub version: i64,
    pub last_updated: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Canceled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "canceled" => Some(TransactionStatus::Canceled),
            _ => None,
        }
    }
}

impl Transaction {
    pub fn sync_state(&self) -> SyncState {
        sync_state(self.last_synced_at, self.last_updated)
    }
}
