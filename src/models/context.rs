// models/context.rs - Ambient identity snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted `(user_id, account_id)` identity used to stamp queued work
/// without a live auth call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfflineContext {
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OfflineContext {
    pub fn is_complete(&self) -> bool {
        self.user_id.is_some() && self.account_id.is_some()
    }
}
