// models/project.rs - Project entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sync_state, SyncState};

/// Account-scoped container for items and transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub account_id: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,

    // Mutable, conflict-compared
    pub name: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub design_fee: Option<f64>,
    pub default_category_id: Option<String>,
    pub status: Option<String>,
    /// Free-form per-project settings blob.
    pub settings: serde_json::Value,
    /// Ordered budget category definitions.
    pub budget_categories: serde_json::Value,

    // Engine-managed
    pub version: i64,
    pub last_updated: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn sync_state(&self) -> SyncState {
        sync_state(self.last_synced_at, self.last_updated)
    }
}
