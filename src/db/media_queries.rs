// db/media_queries.rs - Media blobs and the upload queue

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{Media, MediaUpload};
use crate::Result;

/// Uploads past this many attempts are parked for manual retry
const MAX_UPLOAD_RETRIES: i64 = 5;

#[derive(Debug, sqlx::FromRow)]
struct MediaUploadRow {
    id: String,
    media_id: String,
    item_id: String,
    account_id: String,
    metadata: Option<String>,
    queued_at: DateTime<Utc>,
    retry_count: i64,
    last_error: Option<String>,
}

impl MediaUploadRow {
    fn into_model(self) -> Result<MediaUpload> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(MediaUpload {
            id: self.id,
            media_id: self.media_id,
            item_id: self.item_id,
            account_id: self.account_id,
            metadata,
            queued_at: self.queued_at,
            retry_count: self.retry_count,
            last_error: self.last_error,
        })
    }
}

/// Sum of stored blob sizes (the quota denominator's numerator)
pub async fn usage_bytes(pool: &SqlitePool) -> Result<i64> {
    let sum: (Option<i64>,) = sqlx::query_as("SELECT SUM(size) FROM media")
        .fetch_one(pool)
        .await?;
    Ok(sum.0.unwrap_or(0))
}

pub async fn insert_media(pool: &SqlitePool, media: &Media) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media (
            id, item_id, account_id, filename, mime_type, size, bytes,
            uploaded_at, expires_at, remote_url
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&media.id)
    .bind(&media.item_id)
    .bind(&media.account_id)
    .bind(&media.filename)
    .bind(&media.mime_type)
    .bind(media.size)
    .bind(&media.bytes)
    .bind(media.uploaded_at)
    .bind(media.expires_at)
    .bind(&media.remote_url)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_media(pool: &SqlitePool, id: &str) -> Result<Option<Media>> {
    let media = sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(media)
}

pub async fn media_by_item(pool: &SqlitePool, item_id: &str) -> Result<Vec<Media>> {
    let media = sqlx::query_as::<_, Media>(
        "SELECT * FROM media WHERE item_id = ? ORDER BY uploaded_at ASC",
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(media)
}

pub async fn delete_media(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM media WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_remote_url(pool: &SqlitePool, id: &str, url: &str) -> Result<()> {
    sqlx::query("UPDATE media SET remote_url = ? WHERE id = ?")
        .bind(url)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete media whose expiry is in the past; returns the deleted count
pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM media WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Persist the media blob and its queue entry atomically
pub async fn insert_media_with_upload(
    pool: &SqlitePool,
    media: &Media,
    upload: &MediaUpload,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO media (
            id, item_id, account_id, filename, mime_type, size, bytes,
            uploaded_at, expires_at, remote_url
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&media.id)
    .bind(&media.item_id)
    .bind(&media.account_id)
    .bind(&media.filename)
    .bind(&media.mime_type)
    .bind(media.size)
    .bind(&media.bytes)
    .bind(media.uploaded_at)
    .bind(media.expires_at)
    .bind(&media.remote_url)
    .execute(&mut *tx)
    .await?;

    let metadata = upload
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO media_upload_queue (
            id, media_id, item_id, account_id, metadata, queued_at,
            retry_count, last_error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&upload.id)
    .bind(&upload.media_id)
    .bind(&upload.item_id)
    .bind(&upload.account_id)
    .bind(metadata)
    .bind(upload.queued_at)
    .bind(upload.retry_count)
    .bind(&upload.last_error)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Uploads still within their retry budget, oldest first
pub async fn pending_uploads(pool: &SqlitePool, account_id: &str) -> Result<Vec<MediaUpload>> {
    let rows = sqlx::query_as::<_, MediaUploadRow>(
        r#"
        SELECT * FROM media_upload_queue
        WHERE account_id = ? AND retry_count < ?
        ORDER BY queued_at ASC, id ASC
        "#,
    )
    .bind(account_id)
    .bind(MAX_UPLOAD_RETRIES)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MediaUploadRow::into_model).collect()
}

pub async fn accounts_with_uploads(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT account_id FROM media_upload_queue
        WHERE retry_count < ?
        ORDER BY account_id
        "#,
    )
    .bind(MAX_UPLOAD_RETRIES)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn delete_upload(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM media_upload_queue WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn upload_mark_failed(pool: &SqlitePool, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE media_upload_queue
        SET retry_count = retry_count + 1, last_error = ?
        WHERE id = ?
        "#,
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}
