// testutil.rs - Shared fixtures: sample entities and stub server contracts

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::context::ContextManager;
use crate::metadata::{BudgetCategory, TaxPreset, VendorDefault};
use crate::models::{Item, Media, Project, Transaction, TransactionStatus};
use crate::remote::{RemoteStore, Session, SessionProvider};
use crate::{Error, Result};

pub async fn set_context(context: &ContextManager, user_id: &str, account_id: &str) {
    context.set(user_id, account_id).await.unwrap();
}

pub fn sample_item(item_id: &str, account_id: &str) -> Item {
    let now = Utc::now();
    Item {
        item_id: item_id.to_string(),
        account_id: account_id.to_string(),
        qr_key: None,
        created_by: Some("user-1".to_string()),
        date_created: now,
        origin_transaction_id: None,
        name: "Sample Item".to_string(),
        description: None,
        source: None,
        sku: None,
        price: Some(100.0),
        purchase_price: Some(80.0),
        project_price: None,
        market_value: None,
        payment_method: None,
        disposition: None,
        notes: None,
        space: None,
        tax_rate_pct: None,
        tax_amount_purchase_price: None,
        tax_amount_project_price: None,
        bookmark: false,
        inventory_status: None,
        business_inventory_location: None,
        project_id: None,
        transaction_id: None,
        latest_transaction_id: None,
        primary_image_url: None,
        version: 1,
        last_updated: now,
        last_synced_at: None,
    }
}

pub fn sample_transaction(
    transaction_id: &str,
    account_id: &str,
    project_id: Option<&str>,
) -> Transaction {
    let now = Utc::now();
    Transaction {
        transaction_id: transaction_id.to_string(),
        account_id: account_id.to_string(),
        project_id: project_id.map(str::to_string),
        created_by: Some("user-1".to_string()),
        transaction_date: now,
        amount: 250.0,
        allocated_amount: None,
        category_id: None,
        tax_rate_preset: None,
        tax_rate_pct: None,
        subtotal: None,
        status: TransactionStatus::Pending,
        notes: None,
        item_ids: vec!["item-1".to_string(), "item-2".to_string()],
        needs_review: false,
        sum_item_purchase_prices: None,
        reimbursement_type: None,
        trigger_event: None,
        version: 1,
        last_updated: now,
        last_synced_at: None,
    }
}

pub fn sample_project(id: &str, account_id: &str) -> Project {
    let now = Utc::now();
    Project {
        id: id.to_string(),
        account_id: account_id.to_string(),
        created_by: Some("user-1".to_string()),
        created_at: now,
        name: "Sample Project".to_string(),
        description: None,
        budget: Some(10_000.0),
        design_fee: None,
        default_category_id: None,
        status: Some("active".to_string()),
        settings: serde_json::json!({}),
        budget_categories: serde_json::json!([]),
        version: 1,
        last_updated: now,
        last_synced_at: None,
    }
}

#[derive(Default)]
struct Failures {
    network_upserts: u32,
    conflict_upserts: u32,
    uploads: u32,
}

/// In-memory server double implementing the remote store contract
///
/// Upserts echo the payload back (the "server confirms" path); failure
/// injection covers transient errors and optimistic-concurrency
/// rejections.
#[derive(Default)]
pub struct StubRemote {
    items: Mutex<HashMap<String, Item>>,
    transactions: Mutex<HashMap<String, Transaction>>,
    projects: Mutex<HashMap<String, Project>>,
    budget_categories: Mutex<Vec<BudgetCategory>>,
    tax_presets: Mutex<Vec<TaxPreset>>,
    vendor_defaults: Mutex<Vec<VendorDefault>>,
    failures: Mutex<Failures>,
    delivered: Mutex<Vec<String>>,
}

impl StubRemote {
    /// Seed a server-side item row
    pub fn put_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.item_id.clone(), item);
    }

    pub fn put_transaction(&self, transaction: Transaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction.transaction_id.clone(), transaction);
    }

    pub fn put_project(&self, project: Project) {
        self.projects
            .lock()
            .unwrap()
            .insert(project.id.clone(), project);
    }

    pub fn server_item(&self, item_id: &str) -> Option<Item> {
        self.items.lock().unwrap().get(item_id).cloned()
    }

    pub fn set_budget_categories(&self, categories: Vec<BudgetCategory>) {
        *self.budget_categories.lock().unwrap() = categories;
    }

    pub fn set_tax_presets(&self, presets: Vec<TaxPreset>) {
        *self.tax_presets.lock().unwrap() = presets;
    }

    pub fn set_vendor_defaults(&self, defaults: Vec<VendorDefault>) {
        *self.vendor_defaults.lock().unwrap() = defaults;
    }

    /// The next `n` upserts fail with a transient network error
    pub fn fail_next_upserts(&self, n: u32) {
        self.failures.lock().unwrap().network_upserts = n;
    }

    /// The next `n` upserts are rejected as stale versions
    pub fn conflict_next_upserts(&self, n: u32) {
        self.failures.lock().unwrap().conflict_upserts = n;
    }

    pub fn fail_next_uploads(&self, n: u32) {
        self.failures.lock().unwrap().uploads = n;
    }

    /// Entity ids in server delivery order
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    fn take_upsert_failure(&self) -> Option<Error> {
        let mut failures = self.failures.lock().unwrap();
        if failures.conflict_upserts > 0 {
            failures.conflict_upserts -= 1;
            return Some(Error::Conflict("row advanced on server".to_string()));
        }
        if failures.network_upserts > 0 {
            failures.network_upserts -= 1;
            return Some(Error::Network("Network error".to_string()));
        }
        None
    }

    fn record_delivery(&self, entity_id: &str) {
        self.delivered.lock().unwrap().push(entity_id.to_string());
    }
}

#[async_trait]
impl RemoteStore for StubRemote {
    async fn upsert_item(&self, item: &Item) -> Result<Item> {
        if let Some(error) = self.take_upsert_failure() {
            return Err(error);
        }
        self.record_delivery(&item.item_id);
        let mut echoed = item.clone();
        echoed.last_synced_at = None;
        self.items
            .lock()
            .unwrap()
            .insert(echoed.item_id.clone(), echoed.clone());
        Ok(echoed)
    }

    async fn list_items_by_project(&self, project_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect())
    }

    async fn list_items_by_account(&self, account_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        if let Some(error) = self.take_upsert_failure() {
            return Err(error);
        }
        self.record_delivery(item_id);
        self.items.lock().unwrap().remove(item_id);
        Ok(())
    }

    async fn upsert_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        if let Some(error) = self.take_upsert_failure() {
            return Err(error);
        }
        self.record_delivery(&transaction.transaction_id);
        let mut echoed = transaction.clone();
        echoed.last_synced_at = None;
        self.transactions
            .lock()
            .unwrap()
            .insert(echoed.transaction_id.clone(), echoed.clone());
        Ok(echoed)
    }

    async fn list_transactions_by_project(&self, project_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect())
    }

    async fn list_business_transactions(&self, account_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.account_id == account_id && t.project_id.is_none())
            .cloned()
            .collect())
    }

    async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        if let Some(error) = self.take_upsert_failure() {
            return Err(error);
        }
        self.record_delivery(transaction_id);
        self.transactions.lock().unwrap().remove(transaction_id);
        Ok(())
    }

    async fn upsert_project(&self, project: &Project) -> Result<Project> {
        if let Some(error) = self.take_upsert_failure() {
            return Err(error);
        }
        self.record_delivery(&project.id);
        let mut echoed = project.clone();
        echoed.last_synced_at = None;
        self.projects
            .lock()
            .unwrap()
            .insert(echoed.id.clone(), echoed.clone());
        Ok(echoed)
    }

    async fn list_projects(&self, account_id: &str) -> Result<Vec<Project>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn upload_media(&self, media: &Media) -> Result<String> {
        {
            let mut failures = self.failures.lock().unwrap();
            if failures.uploads > 0 {
                failures.uploads -= 1;
                return Err(Error::Network("Network error".to_string()));
            }
        }
        Ok(format!("https://cdn.example.com/media/{}", media.id))
    }

    async fn fetch_budget_categories(&self, _account_id: &str) -> Result<Vec<BudgetCategory>> {
        Ok(self.budget_categories.lock().unwrap().clone())
    }

    async fn fetch_tax_presets(&self, _account_id: &str) -> Result<Vec<TaxPreset>> {
        Ok(self.tax_presets.lock().unwrap().clone())
    }

    async fn fetch_vendor_defaults(&self, _account_id: &str) -> Result<Vec<VendorDefault>> {
        Ok(self.vendor_defaults.lock().unwrap().clone())
    }
}

/// Session double: a long-lived token by default, optionally one that
/// needs refreshing so the drain's precheck is observable
pub struct StubSessions {
    near_expiry: Mutex<bool>,
    pub refreshes: Mutex<u32>,
}

impl Default for StubSessions {
    fn default() -> Self {
        Self {
            near_expiry: Mutex::new(false),
            refreshes: Mutex::new(0),
        }
    }
}

impl StubSessions {
    pub fn expire_soon(&self) {
        *self.near_expiry.lock().unwrap() = true;
    }

    pub fn refresh_count(&self) -> u32 {
        *self.refreshes.lock().unwrap()
    }
}

#[async_trait]
impl SessionProvider for StubSessions {
    async fn current_user_id(&self) -> Result<Option<String>> {
        Ok(Some("user-1".to_string()))
    }

    async fn session(&self) -> Result<Session> {
        let near_expiry = *self.near_expiry.lock().unwrap();
        let expires_at = if near_expiry {
            Utc::now() + Duration::seconds(60)
        } else {
            Utc::now() + Duration::hours(2)
        };
        Ok(Session {
            access_token: "token".to_string(),
            expires_at,
        })
    }

    async fn refresh_session(&self) -> Result<Session> {
        *self.near_expiry.lock().unwrap() = false;
        *self.refreshes.lock().unwrap() += 1;
        self.session().await
    }
}
