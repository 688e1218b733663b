// remote/mod.rs - What the engine needs from the server

pub mod client;
pub mod wire;

pub use client::ApiClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{BudgetCategory, TaxPreset, VendorDefault};
use crate::models::{Item, Media, Project, Transaction};
use crate::Result;

/// Bearer session handed out by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session is expired or will expire within buffer_seconds
    pub fn is_expired(&self, buffer_seconds: i64) -> bool {
        self.expires_at.timestamp() <= Utc::now().timestamp() + buffer_seconds
    }

    /// Check if the session needs refresh (5 minutes buffer)
    pub fn needs_refresh(&self) -> bool {
        self.is_expired(300)
    }
}

/// Identity / session contract. Called only when online; the drain
/// refreshes before starting if the token is near expiry.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_user_id(&self) -> Result<Option<String>>;
    async fn session(&self) -> Result<Session>;
    async fn refresh_session(&self) -> Result<Session>;
}

/// Keyed CRUD surface with optimistic concurrency
///
/// Upserts return the authoritative row (post-commit version included);
/// a stale-version write is rejected with `Error::Conflict`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert_item(&self, item: &Item) -> Result<Item>;
    async fn list_items_by_project(&self, project_id: &str) -> Result<Vec<Item>>;
    async fn list_items_by_account(&self, account_id: &str) -> Result<Vec<Item>>;
    async fn delete_item(&self, item_id: &str) -> Result<()>;

    async fn upsert_transaction(&self, transaction: &Transaction) -> Result<Transaction>;
    async fn list_transactions_by_project(&self, project_id: &str) -> Result<Vec<Transaction>>;
    async fn list_business_transactions(&self, account_id: &str) -> Result<Vec<Transaction>>;
    async fn delete_transaction(&self, transaction_id: &str) -> Result<()>;

    async fn upsert_project(&self, project: &Project) -> Result<Project>;
    async fn list_projects(&self, account_id: &str) -> Result<Vec<Project>>;

    /// Push media bytes; returns the server URL for the blob.
    async fn upload_media(&self, media: &Media) -> Result<String>;

    async fn fetch_budget_categories(&self, account_id: &str) -> Result<Vec<BudgetCategory>>;
    async fn fetch_tax_presets(&self, account_id: &str) -> Result<Vec<TaxPreset>>;
    async fn fetch_vendor_defaults(&self, account_id: &str) -> Result<Vec<VendorDefault>>;
}
