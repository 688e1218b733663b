// metadata.rs - Read-through cache for slowly-changing reference data

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::cache_queries;
use crate::network::NetworkGate;
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// Vendor defaults are a fixed-size ordered slot list
pub const VENDOR_DEFAULT_SLOTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct BudgetCategory {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct TaxPreset {
    pub id: String,
    pub name: String,
    pub rate_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct VendorDefault {
    pub slot: i64,
    pub name: String,
}

/// Per-account read-through cache
///
/// Online: fetch, persist, return. Offline or fetch failure: serve the
/// cached copy. An empty cache in strict mode is an error the UI turns
/// into "go online and retry". Cache persistence failures degrade to
/// pass-through with a warning; they never fail the read.
pub struct MetadataCache {
    pool: SqlitePool,
}

impl MetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_budget_categories(
        &self,
        remote: &dyn RemoteStore,
        gate: &NetworkGate,
        account_id: &str,
        strict: bool,
    ) -> Result<Vec<BudgetCategory>> {
        if gate.is_online() {
            match gate
                .with_timeout(remote.fetch_budget_categories(account_id))
                .await
            {
                Ok(categories) => {
                    if let Err(e) = cache_queries::replace_budget_categories(
                        &self.pool,
                        account_id,
                        &categories,
                    )
                    .await
                    {
                        tracing::warn!("Budget category cache write failed: {}", e);
                    }
                    return Ok(categories);
                }
                Err(e) => {
                    tracing::warn!("Budget category fetch failed, serving cache: {}", e);
                }
            }
        }

        let cached = cache_queries::cached_budget_categories(&self.pool, account_id).await?;
        if cached.is_empty() && strict {
            return Err(Error::Sync(
                "Budget category cache is empty; go online and retry".to_string(),
            ));
        }
        Ok(cached)
    }

    pub async fn get_tax_presets(
        &self,
        remote: &dyn RemoteStore,
        gate: &NetworkGate,
        account_id: &str,
        strict: bool,
    ) -> Result<Vec<TaxPreset>> {
        if gate.is_online() {
            match gate.with_timeout(remote.fetch_tax_presets(account_id)).await {
                Ok(presets) => {
                    if let Err(e) =
                        cache_queries::replace_tax_presets(&self.pool, account_id, &presets).await
                    {
                        tracing::warn!("Tax preset cache write failed: {}", e);
                    }
                    return Ok(presets);
                }
                Err(e) => {
                    tracing::warn!("Tax preset fetch failed, serving cache: {}", e);
                }
            }
        }

        let cached = cache_queries::cached_tax_presets(&self.pool, account_id).await?;
        if cached.is_empty() && strict {
            return Err(Error::Sync(
                "Tax preset cache is empty; go online and retry".to_string(),
            ));
        }
        Ok(cached)
    }

    pub async fn get_vendor_defaults(
        &self,
        remote: &dyn RemoteStore,
        gate: &NetworkGate,
        account_id: &str,
        strict: bool,
    ) -> Result<Vec<VendorDefault>> {
        if gate.is_online() {
            match gate
                .with_timeout(remote.fetch_vendor_defaults(account_id))
                .await
            {
                Ok(defaults) => {
                    match validate_vendor_defaults(&defaults) {
                        Ok(()) => {
                            if let Err(e) = cache_queries::replace_vendor_defaults(
                                &self.pool,
                                account_id,
                                &defaults,
                            )
                            .await
                            {
                                tracing::warn!("Vendor default cache write failed: {}", e);
                            }
                            return Ok(defaults);
                        }
                        Err(e) => {
                            tracing::warn!("Server vendor defaults rejected: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Vendor default fetch failed, serving cache: {}", e);
                }
            }
        }

        let cached = cache_queries::cached_vendor_defaults(&self.pool, account_id).await?;
        if cached.is_empty() && strict {
            return Err(Error::Sync(
                "Vendor default cache is empty; go online and retry".to_string(),
            ));
        }
        Ok(cached)
    }

    /// Write the ordered vendor default slots; any length other than the
    /// fixed slot count is rejected
    pub async fn save_vendor_defaults(
        &self,
        account_id: &str,
        defaults: &[VendorDefault],
    ) -> Result<()> {
        validate_vendor_defaults(defaults)?;
        cache_queries::replace_vendor_defaults(&self.pool, account_id, defaults).await
    }

    /// Ad-hoc keyed cache for payloads without a dedicated table
    pub async fn set_cached(
        &self,
        key: &str,
        data: &serde_json::Value,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        cache_queries::set_cache(&self.pool, key, data, expires_at).await
    }

    pub async fn get_cached(&self, key: &str) -> Result<Option<crate::models::CacheEntry>> {
        cache_queries::get_cache(&self.pool, key).await
    }

    /// Sweep expired generic cache rows; returns the purged count
    pub async fn purge_expired(&self) -> Result<u64> {
        cache_queries::purge_expired_cache(&self.pool).await
    }
}

fn validate_vendor_defaults(defaults: &[VendorDefault]) -> Result<()> {
    if defaults.len() != VENDOR_DEFAULT_SLOTS {
        return Err(Error::Validation(format!(
            "Vendor defaults require exactly {} slots, got {}",
            VENDOR_DEFAULT_SLOTS,
            defaults.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::testutil::StubRemote;
    use std::sync::Arc;

    fn ten_vendors() -> Vec<VendorDefault> {
        (0..10)
            .map(|slot| VendorDefault {
                slot,
                name: format!("Vendor {}", slot),
            })
            .collect()
    }

    #[tokio::test]
    async fn online_fetch_persists_and_returns() {
        let db = Database::in_memory().await.unwrap();
        let cache = MetadataCache::new(db.pool.clone());
        let remote = Arc::new(StubRemote::default());
        remote.set_budget_categories(vec![BudgetCategory {
            id: "cat-1".to_string(),
            name: "Furniture".to_string(),
            sort_order: 0,
        }]);
        let gate = NetworkGate::default();
        gate.set_online(true);

        let fetched = cache
            .get_budget_categories(remote.as_ref(), &gate, "acct-1", false)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);

        // Offline read serves the persisted copy
        gate.set_online(false);
        let cached = cache
            .get_budget_categories(remote.as_ref(), &gate, "acct-1", false)
            .await
            .unwrap();
        assert_eq!(cached, fetched);
    }

    #[tokio::test]
    async fn empty_cache_in_strict_mode_errors() {
        let db = Database::in_memory().await.unwrap();
        let cache = MetadataCache::new(db.pool.clone());
        let remote = Arc::new(StubRemote::default());
        let gate = NetworkGate::default();

        let result = cache
            .get_tax_presets(remote.as_ref(), &gate, "acct-1", true)
            .await;
        match result {
            Err(Error::Sync(message)) => assert!(message.contains("go online and retry")),
            other => panic!("expected strict-mode error, got {:?}", other.map(|v| v.len())),
        }

        // Non-strict degrades to empty
        let lenient = cache
            .get_tax_presets(remote.as_ref(), &gate, "acct-1", false)
            .await
            .unwrap();
        assert!(lenient.is_empty());
    }

    #[tokio::test]
    async fn vendor_defaults_enforce_ten_slots() {
        let db = Database::in_memory().await.unwrap();
        let cache = MetadataCache::new(db.pool.clone());

        let mut nine = ten_vendors();
        nine.pop();
        let result = cache.save_vendor_defaults("acct-1", &nine).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        cache
            .save_vendor_defaults("acct-1", &ten_vendors())
            .await
            .unwrap();

        let remote = Arc::new(StubRemote::default());
        let gate = NetworkGate::default();
        let cached = cache
            .get_vendor_defaults(remote.as_ref(), &gate, "acct-1", true)
            .await
            .unwrap();
        assert_eq!(cached.len(), VENDOR_DEFAULT_SLOTS);
        assert_eq!(cached[3].name, "Vendor 3");
    }
}
