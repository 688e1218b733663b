// models/mod.rs - Entity models shared across the engine

pub mod context;
pub mod item;
pub mod media;
pub mod project;
pub mod transaction;

pub use context::OfflineContext;
pub use item::Item;
pub use media::{Media, MediaFile, MediaUpload};
pub use project::Project;
pub use transaction::{Transaction, TransactionStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity kinds the engine synchronizes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Item,
    Transaction,
    Project,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Item => "item",
            EntityType::Transaction => "transaction",
            EntityType::Project => "project",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "item" => Some(EntityType::Item),
            "transaction" => Some(EntityType::Transaction),
            "project" => Some(EntityType::Project),
            _ => None,
        }
    }
}

/// Sync state of a locally stored entity
///
/// Exactly one of these holds for every row in the local store. An entity
/// is synced when its last successful round-trip is at least as recent as
/// its last local edit; conflicted state is owned by the conflict store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Dirty,
}

pub(crate) fn sync_state(
    last_synced_at: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
) -> SyncState {
    match last_synced_at {
        Some(synced) if synced >= last_updated => SyncState::Synced,
        _ => SyncState::Dirty,
    }
}

/// Generic cache row stored in the `cache` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entity_is_synced_only_when_stamp_covers_last_edit() {
        let edited = Utc::now();

        assert_eq!(sync_state(None, edited), SyncState::Dirty);
        assert_eq!(
            sync_state(Some(edited - Duration::seconds(30)), edited),
            SyncState::Dirty
        );
        assert_eq!(
            sync_state(Some(edited + Duration::seconds(1)), edited),
            SyncState::Synced
        );
    }
}
