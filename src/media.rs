// media.rs - Byte-accurate local media storage with quota and upload queue
//
// Media syncs through its own queue rather than the operation queue:
// payloads are large and must not block small entity writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::media_queries;
use crate::models::{Media, MediaFile, MediaUpload};
use crate::network::NetworkGate;
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// Default quota ceiling (~50 MiB) when the platform does not report one
pub const DEFAULT_QUOTA_BYTES: i64 = 50 * 1024 * 1024;

/// Fraction of the quota past which new bytes are refused
const QUOTA_THRESHOLD: f64 = 0.9;

/// Result of queueing an upload while offline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMedia {
    pub queued: bool,
    pub media_id: String,
}

/// Outcome of one media drain pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaDrainReport {
    pub uploaded: u32,
    pub failed: u32,
}

pub struct MediaStore {
    pool: SqlitePool,
    quota_bytes: i64,
}

impl MediaStore {
    pub fn new(pool: SqlitePool, quota_bytes: i64) -> Self {
        Self { pool, quota_bytes }
    }

    /// Current usage across all stored blobs
    pub async fn usage_bytes(&self) -> Result<i64> {
        media_queries::usage_bytes(&self.pool).await
    }

    /// Store media bytes locally
    ///
    /// Refuses the write when accepting it would push usage past 90% of
    /// the estimated quota; nothing is written in that case.
    pub async fn save_media_file(
        &self,
        account_id: &str,
        item_id: &str,
        file: MediaFile,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Media> {
        let media = self.build_media(account_id, item_id, file, expires_at).await?;
        media_queries::insert_media(&self.pool, &media).await?;

        tracing::debug!("Stored media {} ({} bytes)", media.id, media.size);
        Ok(media)
    }

    /// Persist bytes locally and append an upload-queue entry referencing
    /// them, atomically. Used while offline.
    pub async fn queue_media_upload(
        &self,
        account_id: &str,
        item_id: &str,
        file: MediaFile,
        metadata: Option<serde_json::Value>,
    ) -> Result<QueuedMedia> {
        let media = self.build_media(account_id, item_id, file, None).await?;

        let upload = MediaUpload {
            id: Uuid::new_v4().to_string(),
            media_id: media.id.clone(),
            item_id: item_id.to_string(),
            account_id: account_id.to_string(),
            metadata,
            queued_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        };

        media_queries::insert_media_with_upload(&self.pool, &media, &upload).await?;

        tracing::debug!("Queued media upload {} for item {}", media.id, item_id);
        Ok(QueuedMedia {
            queued: true,
            media_id: media.id,
        })
    }

    pub async fn get_media(&self, media_id: &str) -> Result<Option<Media>> {
        media_queries::get_media(&self.pool, media_id).await
    }

    pub async fn media_for_item(&self, item_id: &str) -> Result<Vec<Media>> {
        media_queries::media_by_item(&self.pool, item_id).await
    }

    pub async fn pending_uploads(&self, account_id: &str) -> Result<Vec<MediaUpload>> {
        media_queries::pending_uploads(&self.pool, account_id).await
    }

    /// Drain the upload queue for one account
    ///
    /// Each successful upload attaches the server URL to the media row and
    /// swaps the `offline://` sentinel on the owning item for it.
    pub async fn process_queued_uploads(
        &self,
        remote: &dyn RemoteStore,
        gate: &NetworkGate,
        account_id: &str,
    ) -> Result<MediaDrainReport> {
        let mut report = MediaDrainReport::default();

        if !gate.is_online() {
            return Ok(report);
        }

        for upload in media_queries::pending_uploads(&self.pool, account_id).await? {
            if !gate.is_online() {
                break;
            }

            let Some(media) = media_queries::get_media(&self.pool, &upload.media_id).await? else {
                // Blob deleted out from under the queue entry
                media_queries::delete_upload(&self.pool, &upload.id).await?;
                continue;
            };

            match gate.with_timeout(remote.upload_media(&media)).await {
                Ok(url) => {
                    media_queries::set_remote_url(&self.pool, &media.id, &url).await?;
                    self.replace_offline_sentinel(&media, &url).await?;
                    media_queries::delete_upload(&self.pool, &upload.id).await?;
                    report.uploaded += 1;
                    tracing::info!("Uploaded media {} -> {}", media.id, url);
                }
                Err(e) => {
                    media_queries::upload_mark_failed(&self.pool, &upload.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                    tracing::warn!("Media upload {} failed: {}", upload.id, e);
                }
            }
        }

        Ok(report)
    }

    /// Drop a blob the user no longer wants (with any queued upload)
    pub async fn delete_media(&self, media_id: &str) -> Result<()> {
        media_queries::delete_media(&self.pool, media_id).await
    }

    /// Delete media past their expiry; returns the deleted count
    pub async fn cleanup_expired_media(&self) -> Result<u64> {
        let deleted = media_queries::delete_expired(&self.pool, Utc::now()).await?;
        if deleted > 0 {
            tracing::info!("Purged {} expired media blob(s)", deleted);
        }
        Ok(deleted)
    }

    async fn build_media(
        &self,
        account_id: &str,
        item_id: &str,
        file: MediaFile,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Media> {
        let size = file.bytes.len() as i64;
        self.check_quota(size).await?;

        Ok(Media {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            account_id: account_id.to_string(),
            filename: file.filename,
            mime_type: file.mime_type,
            size,
            bytes: file.bytes,
            uploaded_at: Utc::now(),
            expires_at,
            remote_url: None,
        })
    }

    async fn check_quota(&self, incoming: i64) -> Result<()> {
        let usage = media_queries::usage_bytes(&self.pool).await?;
        let projected = usage + incoming;

        if (projected as f64) > (self.quota_bytes as f64) * QUOTA_THRESHOLD {
            return Err(Error::StorageQuota(format!(
                "Storage quota nearly full: {} of {} bytes used",
                usage, self.quota_bytes
            )));
        }

        Ok(())
    }

    async fn replace_offline_sentinel(&self, media: &Media, url: &str) -> Result<()> {
        let sentinel = media.offline_url();

        sqlx::query(
            "UPDATE items SET primary_image_url = ? WHERE item_id = ? AND primary_image_url = ?",
        )
        .bind(url)
        .bind(&media.item_id)
        .bind(&sentinel)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entity_queries::{self, WriteSource};
    use crate::db::Database;
    use crate::testutil::{sample_item, StubRemote};
    use std::sync::Arc;

    fn jpeg(bytes: usize) -> MediaFile {
        MediaFile {
            filename: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0xAB; bytes],
        }
    }

    #[tokio::test]
    async fn save_keeps_bytes_exactly() {
        let db = Database::in_memory().await.unwrap();
        let store = MediaStore::new(db.pool.clone(), DEFAULT_QUOTA_BYTES);

        let media = store
            .save_media_file("acct-1", "item-123", jpeg(10), None)
            .await
            .unwrap();

        let stored = store.get_media(&media.id).await.unwrap().unwrap();
        assert_eq!(stored.size, 10);
        assert_eq!(stored.bytes, vec![0xAB; 10]);
        assert_eq!(stored.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn quota_rejection_writes_nothing() {
        let db = Database::in_memory().await.unwrap();
        // 150 MiB quota with 135 MiB already in use
        let store = MediaStore::new(db.pool.clone(), 150 * 1024 * 1024);
        let existing = Media {
            id: "m-existing".to_string(),
            item_id: "item-0".to_string(),
            account_id: "acct-1".to_string(),
            filename: "big.bin".to_string(),
            mime_type: "application/octet-stream".to_string(),
            size: 135 * 1024 * 1024,
            bytes: vec![0; 8],
            uploaded_at: Utc::now(),
            expires_at: None,
            remote_url: None,
        };
        media_queries::insert_media(&db.pool, &existing).await.unwrap();

        let result = store
            .save_media_file("acct-1", "item-123", jpeg(1024 * 1024), None)
            .await;

        match result {
            Err(Error::StorageQuota(message)) => {
                assert!(message.contains("Storage quota nearly full"))
            }
            other => panic!("expected quota error, got {:?}", other.map(|m| m.id)),
        }

        let media = store.media_for_item("item-123").await.unwrap();
        assert!(media.is_empty());
    }

    #[tokio::test]
    async fn saves_below_threshold_succeed() {
        let db = Database::in_memory().await.unwrap();
        let store = MediaStore::new(db.pool.clone(), 1024);

        // 900 of 1024 bytes stays below the 90% threshold
        store
            .save_media_file("acct-1", "item-1", jpeg(900), None)
            .await
            .unwrap();

        // The next byte crosses it
        let result = store.save_media_file("acct-1", "item-1", jpeg(50), None).await;
        assert!(matches!(result, Err(Error::StorageQuota(_))));
    }

    #[tokio::test]
    async fn offline_queue_then_drain_replaces_sentinel() {
        let db = Database::in_memory().await.unwrap();
        let store = MediaStore::new(db.pool.clone(), DEFAULT_QUOTA_BYTES);
        let remote = Arc::new(StubRemote::default());
        let gate = NetworkGate::default();

        let queued = store
            .queue_media_upload("acct-1", "item-123", jpeg(10), None)
            .await
            .unwrap();
        assert!(queued.queued);

        // Bytes and the queue entry both landed
        let media = store.get_media(&queued.media_id).await.unwrap().unwrap();
        assert_eq!(media.bytes.len(), 10);
        let pending = store.pending_uploads("acct-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].media_id, queued.media_id);

        // Owning item carries the sentinel until the upload lands
        let mut item = sample_item("item-123", "acct-1");
        item.primary_image_url = Some(media.offline_url());
        entity_queries::save_item(&db.pool, &item, WriteSource::LocalEdit)
            .await
            .unwrap();

        gate.set_online(true);
        let report = store
            .process_queued_uploads(remote.as_ref(), &gate, "acct-1")
            .await
            .unwrap();
        assert_eq!(report.uploaded, 1);

        assert!(store.pending_uploads("acct-1").await.unwrap().is_empty());
        let item = entity_queries::get_item(&db.pool, "item-123")
            .await
            .unwrap()
            .unwrap();
        let url = item.primary_image_url.unwrap();
        assert!(url.starts_with("https://"), "sentinel not replaced: {}", url);
    }

    #[tokio::test]
    async fn failed_uploads_consume_their_own_retry_budget() {
        let db = Database::in_memory().await.unwrap();
        let store = MediaStore::new(db.pool.clone(), DEFAULT_QUOTA_BYTES);
        let remote = Arc::new(StubRemote::default());
        remote.fail_next_uploads(10);
        let gate = NetworkGate::default();
        gate.set_online(true);

        store
            .queue_media_upload("acct-1", "item-123", jpeg(10), None)
            .await
            .unwrap();

        for _ in 0..5 {
            let report = store
                .process_queued_uploads(remote.as_ref(), &gate, "acct-1")
                .await
                .unwrap();
            assert_eq!(report.failed, 1);
        }

        // Out of budget: no longer offered for upload
        assert!(store.pending_uploads("acct-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_deletes_only_expired_media() {
        let db = Database::in_memory().await.unwrap();
        let store = MediaStore::new(db.pool.clone(), DEFAULT_QUOTA_BYTES);

        store
            .save_media_file(
                "acct-1",
                "item-1",
                jpeg(4),
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        store
            .save_media_file(
                "acct-1",
                "item-2",
                jpeg(4),
                Some(Utc::now() + chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        store
            .save_media_file("acct-1", "item-3", jpeg(4), None)
            .await
            .unwrap();

        let deleted = store.cleanup_expired_media().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.media_for_item("item-1").await.unwrap().is_empty());
        assert_eq!(store.media_for_item("item-2").await.unwrap().len(), 1);
    }
}
