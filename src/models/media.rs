// models/media.rs - Local media blobs and the upload queue rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Byte payload handed to the media store by the UI
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Locally stored media blob
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: String,
    pub item_id: String,
    pub account_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    #[serde(skip_serializing, default)]
    pub bytes: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Server URL once the upload round-trip completed.
    pub remote_url: Option<String>,
}

impl Media {
    /// Sentinel written onto the owning entity until the upload succeeds.
    pub fn offline_url(&self) -> String {
        format!("offline://{}", self.id)
    }
}

/// Pending upload referencing a locally stored media row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUpload {
    pub id: String,
    pub media_id: String,
    pub item_id: String,
    pub account_id: String,
    pub metadata: Option<serde_json::Value>,
    pub queued_at: DateTime<Utc>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}
