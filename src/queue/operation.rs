// queue/operation.rs - Tagged operation variants and the persisted record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EntityType, Item, Project, Transaction};

/// Intended server write, tagged by variant with a payload typed to it
///
/// Unknown variants in persisted payloads are a programming error surfaced
/// at deserialization, not a runtime recovery path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreateItem {
        item: Item,
    },
    UpdateItem {
        item: Item,
    },
    DeleteItem {
        item_id: String,
        project_id: Option<String>,
    },
    AssignItemToTransaction {
        item_id: String,
        transaction_id: String,
    },
    UnlinkItemFromTransaction {
        item_id: String,
        transaction_id: String,
    },
    AllocateItemToProject {
        item_id: String,
        project_id: String,
    },
    DeallocateItem {
        item_id: String,
    },
    MoveItemToBusinessInventory {
        item_id: String,
    },
    SellItemToProject {
        item_id: String,
        project_id: String,
        sale_price: Option<f64>,
    },
    CreateTransaction {
        transaction: Transaction,
    },
    UpdateTransaction {
        transaction: Transaction,
    },
    DeleteTransaction {
        transaction_id: String,
        project_id: Option<String>,
    },
    MoveTransactionToProject {
        transaction_id: String,
        project_id: Option<String>,
    },
    UpdateProject {
        project: Project,
    },
}

impl OperationKind {
    /// Stable tag used for the `op_type` column and its index
    pub fn op_type(&self) -> &'static str {
        match self {
            OperationKind::CreateItem { .. } => "CREATE_ITEM",
            OperationKind::UpdateItem { .. } => "UPDATE_ITEM",
            OperationKind::DeleteItem { .. } => "DELETE_ITEM",
            OperationKind::AssignItemToTransaction { .. } => "ASSIGN_ITEM_TO_TRANSACTION",
            OperationKind::UnlinkItemFromTransaction { .. } => "UNLINK_ITEM_FROM_TRANSACTION",
            OperationKind::AllocateItemToProject { .. } => "ALLOCATE_ITEM_TO_PROJECT",
            OperationKind::DeallocateItem { .. } => "DEALLOCATE_ITEM",
            OperationKind::MoveItemToBusinessInventory { .. } => "MOVE_ITEM_TO_BUSINESS_INVENTORY",
            OperationKind::SellItemToProject { .. } => "SELL_ITEM_TO_PROJECT",
            OperationKind::CreateTransaction { .. } => "CREATE_TRANSACTION",
            OperationKind::UpdateTransaction { .. } => "UPDATE_TRANSACTION",
            OperationKind::DeleteTransaction { .. } => "DELETE_TRANSACTION",
            OperationKind::MoveTransactionToProject { .. } => "MOVE_TRANSACTION_TO_PROJECT",
            OperationKind::UpdateProject { .. } => "UPDATE_PROJECT",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            OperationKind::CreateItem { .. }
            | OperationKind::UpdateItem { .. }
            | OperationKind::DeleteItem { .. }
            | OperationKind::AssignItemToTransaction { .. }
            | OperationKind::UnlinkItemFromTransaction { .. }
            | OperationKind::AllocateItemToProject { .. }
            | OperationKind::DeallocateItem { .. }
            | OperationKind::MoveItemToBusinessInventory { .. }
            | OperationKind::SellItemToProject { .. } => EntityType::Item,
            OperationKind::CreateTransaction { .. }
            | OperationKind::UpdateTransaction { .. }
            | OperationKind::DeleteTransaction { .. }
            | OperationKind::MoveTransactionToProject { .. } => EntityType::Transaction,
            OperationKind::UpdateProject { .. } => EntityType::Project,
        }
    }

    /// Business key of the entity this operation targets
    pub fn entity_id(&self) -> &str {
        match self {
            OperationKind::CreateItem { item } | OperationKind::UpdateItem { item } => {
                &item.item_id
            }
            OperationKind::DeleteItem { item_id, .. }
            | OperationKind::AssignItemToTransaction { item_id, .. }
            | OperationKind::UnlinkItemFromTransaction { item_id, .. }
            | OperationKind::AllocateItemToProject { item_id, .. }
            | OperationKind::DeallocateItem { item_id }
            | OperationKind::MoveItemToBusinessInventory { item_id }
            | OperationKind::SellItemToProject { item_id, .. } => item_id,
            OperationKind::CreateTransaction { transaction }
            | OperationKind::UpdateTransaction { transaction } => &transaction.transaction_id,
            OperationKind::DeleteTransaction { transaction_id, .. }
            | OperationKind::MoveTransactionToProject { transaction_id, .. } => transaction_id,
            OperationKind::UpdateProject { project } => &project.id,
        }
    }

    /// Creates are never gated by conflicts on unrelated entities
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            OperationKind::CreateItem { .. } | OperationKind::CreateTransaction { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Abandoned,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationStatus::Pending),
            "abandoned" => Some(OperationStatus::Abandoned),
            _ => None,
        }
    }
}

/// Persisted pending intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub account_id: String,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub updated_by: String,
    /// Intended post-write version.
    pub version: i64,
    pub status: OperationStatus,
    /// Next attempt is not due before this instant.
    pub scheduled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_item;

    #[test]
    fn payloads_round_trip_through_tagged_json() {
        let op = OperationKind::CreateItem {
            item: sample_item("item-1", "acct-1"),
        };

        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""type":"CREATE_ITEM""#));

        let back: OperationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back.op_type(), "CREATE_ITEM");
        assert_eq!(back.entity_id(), "item-1");
    }

    #[test]
    fn unknown_variant_is_rejected_at_load() {
        let result =
            serde_json::from_str::<OperationKind>(r#"{"type":"FROBNICATE_ITEM","item_id":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn create_operations_bypass_conflict_gate() {
        let create = OperationKind::CreateItem {
            item: sample_item("item-1", "acct-1"),
        };
        let update = OperationKind::UpdateItem {
            item: sample_item("item-1", "acct-1"),
        };
        let assign = OperationKind::AssignItemToTransaction {
            item_id: "item-1".to_string(),
            transaction_id: "tx-1".to_string(),
        };

        assert!(create.is_create());
        assert!(!update.is_create());
        assert!(!assign.is_create());
    }
}
