// remote/client.rs - HTTP client for the sync backend
//
// Provides authentication, request handling, and the RemoteStore /
// SessionProvider implementations the engine drains through.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

use super::wire::{
    align_item, align_project, align_transaction, item_to_wire, project_to_wire,
    transaction_to_wire, ItemRecord, ProjectRecord, TransactionRecord,
};
use super::{RemoteStore, Session, SessionProvider};
use crate::metadata::{BudgetCategory, TaxPreset, VendorDefault};
use crate::models::{Item, Media, Project, Transaction};
use crate::{Error, Result};

/// Authentication credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Authentication response from the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// API client for the sync backend
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
    session: RwLock<Option<Session>>,
    refresh_token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Create a new client
    pub fn new(base_url: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            session: RwLock::new(None),
            refresh_token: RwLock::new(None),
        })
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Authenticate and store the bearer session
    pub async fn authenticate(&self, credentials: Credentials) -> Result<AuthResponse> {
        let url = format!("{}/auth/login", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&credentials)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Authentication request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Auth(format!(
                "Authentication failed with status {}: {}",
                status, error_text
            )));
        }

        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse auth response: {}", e)))?;

        self.store_session(&auth).await;
        tracing::info!("Authenticated user {}", auth.user_id);

        Ok(auth)
    }

    pub async fn sign_out(&self) {
        *self.session.write().await = None;
        *self.refresh_token.write().await = None;
    }

    async fn store_session(&self, auth: &AuthResponse) {
        let session = Session {
            access_token: auth.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(auth.expires_in),
        };
        *self.session.write().await = Some(session);
        *self.refresh_token.write().await = Some(auth.refresh_token.clone());
    }

    async fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(session) = self.session.read().await.as_ref() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", session.access_token))
                .map_err(|e| Error::Auth(format!("Invalid access token: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = self.build_headers().await?;

        let response = self
            .http_client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::Network(format!("GET request failed: {}", e)))?;

        Self::handle_response(response).await
    }

    async fn put_json<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = self.build_headers().await?;

        let response = self
            .http_client
            .put(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("PUT request failed: {}", e)))?;

        Self::handle_response(response).await
    }

    async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = self.build_headers().await?;

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("POST request failed: {}", e)))?;

        Self::handle_response(response).await
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = self.build_headers().await?;

        let response = self
            .http_client
            .delete(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::Network(format!("DELETE request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Network(format!(
                "DELETE request failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }

    /// Map HTTP status to engine errors and extract the JSON body.
    /// 409 is the server's optimistic-concurrency rejection.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(match status.as_u16() {
                401 => Error::Auth(format!("Unauthorized: {}", error_text)),
                403 => Error::Auth(format!("Forbidden: {}", error_text)),
                404 => Error::NotFound(error_text),
                409 => Error::Conflict(format!("Stale version rejected: {}", error_text)),
                _ => Error::Network(format!(
                    "Request failed with status {}: {}",
                    status, error_text
                )),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl SessionProvider for ApiClient {
    async fn current_user_id(&self) -> Result<Option<String>> {
        if !self.is_authenticated().await {
            return Ok(None);
        }
        let me: MeResponse = self.get_json("/auth/me").await?;
        Ok(Some(me.user_id))
    }

    async fn session(&self) -> Result<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("No active session".to_string()))
    }

    async fn refresh_session(&self) -> Result<Session> {
        #[derive(Serialize)]
        struct RefreshRequest {
            refresh_token: String,
        }

        let refresh_token = self
            .refresh_token
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("No refresh token".to_string()))?;

        let auth: AuthResponse = self
            .post_json("/auth/refresh", &RefreshRequest { refresh_token })
            .await
            .map_err(|e| Error::Auth(format!("Session refresh failed: {}", e)))?;

        self.store_session(&auth).await;
        self.session().await
    }
}

#[async_trait]
impl RemoteStore for ApiClient {
    async fn upsert_item(&self, item: &Item) -> Result<Item> {
        let record: ItemRecord = self
            .put_json(
                &format!("/api/items/{}", item.item_id),
                &item_to_wire(item),
            )
            .await?;
        Ok(align_item(record))
    }

    async fn list_items_by_project(&self, project_id: &str) -> Result<Vec<Item>> {
        let records: Vec<ItemRecord> = self
            .get_json(&format!("/api/items?project_id={}", project_id))
            .await?;
        Ok(records.into_iter().map(align_item).collect())
    }

    async fn list_items_by_account(&self, account_id: &str) -> Result<Vec<Item>> {
        let records: Vec<ItemRecord> = self
            .get_json(&format!("/api/items?account_id={}", account_id))
            .await?;
        Ok(records.into_iter().map(align_item).collect())
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.delete(&format!("/api/items/{}", item_id)).await
    }

    async fn upsert_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        let record: TransactionRecord = self
            .put_json(
                &format!("/api/transactions/{}", transaction.transaction_id),
                &transaction_to_wire(transaction),
            )
            .await?;
        Ok(align_transaction(record))
    }

    async fn list_transactions_by_project(&self, project_id: &str) -> Result<Vec<Transaction>> {
        let records: Vec<TransactionRecord> = self
            .get_json(&format!("/api/transactions?project_id={}", project_id))
            .await?;
        Ok(records.into_iter().map(align_transaction).collect())
    }

    async fn list_business_transactions(&self, account_id: &str) -> Result<Vec<Transaction>> {
        let records: Vec<TransactionRecord> = self
            .get_json(&format!(
                "/api/transactions?account_id={}&scope=business",
                account_id
            ))
            .await?;
        Ok(records.into_iter().map(align_transaction).collect())
    }

    async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
        self.delete(&format!("/api/transactions/{}", transaction_id))
            .await
    }

    async fn upsert_project(&self, project: &Project) -> Result<Project> {
        let record: ProjectRecord = self
            .put_json(
                &format!("/api/projects/{}", project.id),
                &project_to_wire(project),
            )
            .await?;
        Ok(align_project(record))
    }

    async fn list_projects(&self, account_id: &str) -> Result<Vec<Project>> {
        let records: Vec<ProjectRecord> = self
            .get_json(&format!("/api/projects?account_id={}", account_id))
            .await?;
        Ok(records.into_iter().map(align_project).collect())
    }

    async fn upload_media(&self, media: &Media) -> Result<String> {
        let url = format!(
            "{}/api/media?item_id={}&account_id={}&filename={}",
            self.base_url, media.item_id, media.account_id, media.filename
        );
        let headers = self.build_headers().await?;

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .header(CONTENT_TYPE, media.mime_type.clone())
            .body(media.bytes.clone())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Media upload failed: {}", e)))?;

        let upload: UploadResponse = Self::handle_response(response).await?;
        Ok(upload.url)
    }

    async fn fetch_budget_categories(&self, account_id: &str) -> Result<Vec<BudgetCategory>> {
        self.get_json(&format!("/api/accounts/{}/budget-categories", account_id))
            .await
    }

    async fn fetch_tax_presets(&self, account_id: &str) -> Result<Vec<TaxPreset>> {
        self.get_json(&format!("/api/accounts/{}/tax-presets", account_id))
            .await
    }

    async fn fetch_vendor_defaults(&self, account_id: &str) -> Result<Vec<VendorDefault>> {
        self.get_json(&format!("/api/accounts/{}/vendor-defaults", account_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_creation_normalizes_base_url() {
        let client = ApiClient::new("https://api.example.com/".to_string()).unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
        assert!(!client.is_authenticated().await);
    }

    #[test]
    fn session_refresh_window_is_five_minutes() {
        let fresh = Session {
            access_token: "t".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        assert!(!fresh.needs_refresh());

        let closing = Session {
            access_token: "t".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(120),
        };
        assert!(closing.needs_refresh());
    }
}
