// conflict/mod.rs - Conflict records, fingerprints and field whitelists

pub mod detector;
pub mod resolver;

pub use detector::ConflictDetector;
pub use resolver::{ConflictResolver, ResolutionStrategy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{EntityType, Item, Project, Transaction};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Version,
    Timestamp,
    Content,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictType::Version => "version",
            ConflictType::Timestamp => "timestamp",
            ConflictType::Content => "content",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "version" => Some(ConflictType::Version),
            "timestamp" => Some(ConflictType::Timestamp),
            "content" => Some(ConflictType::Content),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Server,
    Merge,
    Manual,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Local => "local",
            Resolution::Server => "server",
            Resolution::Merge => "merge",
            Resolution::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Resolution::Local),
            "server" => Some(Resolution::Server),
            "merge" => Some(Resolution::Merge),
            "manual" => Some(Resolution::Manual),
            _ => None,
        }
    }
}

/// One side of a detected divergence: full entity snapshot plus its
/// version and modification timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSide {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

/// Detected divergence between the local row and the server row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub fingerprint: String,
    pub account_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub conflict_type: ConflictType,
    pub field: String,
    pub local: ConflictSide,
    pub server: ConflictSide,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
}

/// Deterministic storage key. Re-detection of the same fingerprint
/// overwrites the stored row rather than duplicating it.
pub fn fingerprint(
    entity_type: EntityType,
    account_id: &str,
    entity_id: &str,
    conflict_type: ConflictType,
    field: &str,
) -> String {
    format!(
        "conflict:{}:{}:{}:{}:{}",
        entity_type.as_str(),
        account_id,
        entity_id,
        conflict_type.as_str(),
        field
    )
}

/// Named accessor over a mutable-compared field, producing a JSON value
/// so deep equality covers arrays and objects uniformly
pub type FieldAccessor<T> = (&'static str, fn(&T) -> Value);

fn jval<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Mutable-compared fields of an item. Relational ids are intentionally
/// absent: they move through explicit assignment operations.
pub const ITEM_FIELDS: &[FieldAccessor<Item>] = &[
    ("name", |i| jval(&i.name)),
    ("description", |i| jval(&i.description)),
    ("source", |i| jval(&i.source)),
    ("sku", |i| jval(&i.sku)),
    ("price", |i| jval(&i.price)),
    ("purchase_price", |i| jval(&i.purchase_price)),
    ("project_price", |i| jval(&i.project_price)),
    ("market_value", |i| jval(&i.market_value)),
    ("payment_method", |i| jval(&i.payment_method)),
    ("disposition", |i| jval(&i.disposition)),
    ("notes", |i| jval(&i.notes)),
    ("space", |i| jval(&i.space)),
    ("tax_rate_pct", |i| jval(&i.tax_rate_pct)),
    ("tax_amount_purchase_price", |i| jval(&i.tax_amount_purchase_price)),
    ("tax_amount_project_price", |i| jval(&i.tax_amount_project_price)),
    ("bookmark", |i| jval(&i.bookmark)),
    ("inventory_status", |i| jval(&i.inventory_status)),
    ("business_inventory_location", |i| {
        jval(&i.business_inventory_location)
    }),
];

pub const TRANSACTION_FIELDS: &[FieldAccessor<Transaction>] = &[
    ("amount", |t| jval(&t.amount)),
    ("allocated_amount", |t| jval(&t.allocated_amount)),
    ("category_id", |t| jval(&t.category_id)),
    ("tax_rate_preset", |t| jval(&t.tax_rate_preset)),
    ("tax_rate_pct", |t| jval(&t.tax_rate_pct)),
    ("subtotal", |t| jval(&t.subtotal)),
    ("status", |t| jval(&t.status)),
    ("notes", |t| jval(&t.notes)),
    ("item_ids", |t| jval(&t.item_ids)),
    ("needs_review", |t| jval(&t.needs_review)),
    ("sum_item_purchase_prices", |t| jval(&t.sum_item_purchase_prices)),
    ("reimbursement_type", |t| jval(&t.reimbursement_type)),
    ("trigger_event", |t| jval(&t.trigger_event)),
];

pub const PROJECT_FIELDS: &[FieldAccessor<Project>] = &[
    ("name", |p| jval(&p.name)),
    ("description", |p| jval(&p.description)),
    ("budget", |p| jval(&p.budget)),
    ("design_fee", |p| jval(&p.design_fee)),
    ("default_category_id", |p| jval(&p.default_category_id)),
    ("status", |p| jval(&p.status)),
    ("settings", |p| jval(&p.settings)),
    ("budget_categories", |p| jval(&p.budget_categories)),
];

/// First whitelisted field whose local and server values deep-differ
pub fn first_differing_field<T>(
    local: &T,
    server: &T,
    fields: &[FieldAccessor<T>],
) -> Option<&'static str> {
    fields
        .iter()
        .find(|(_, accessor)| accessor(local) != accessor(server))
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_item;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(
            EntityType::Item,
            "acct-1",
            "item-1",
            ConflictType::Content,
            "name",
        );
        let b = fingerprint(
            EntityType::Item,
            "acct-1",
            "item-1",
            ConflictType::Content,
            "name",
        );
        assert_eq!(a, b);
        assert_eq!(a, "conflict:item:acct-1:item-1:content:name");
    }

    #[test]
    fn field_diff_finds_first_divergence_only_in_whitelist() {
        let local = sample_item("item-1", "acct-1");
        let mut server = local.clone();
        assert_eq!(first_differing_field(&local, &server, ITEM_FIELDS), None);

        // Relational moves are not field-compared
        server.transaction_id = Some("tx-9".to_string());
        assert_eq!(first_differing_field(&local, &server, ITEM_FIELDS), None);

        server.notes = Some("changed".to_string());
        assert_eq!(
            first_differing_field(&local, &server, ITEM_FIELDS),
            Some("notes")
        );
    }
}
