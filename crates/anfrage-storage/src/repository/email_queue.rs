//! Outbound email queue repository

use crate::db::DatabasePool;
use crate::models::{NewQueueItem, QueueItem, QueueItemRow, QueueStats};
use anfrage_common::types::{QueueItemId, QueueStatus};
use anfrage_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Attempts granted when the caller does not specify a maximum
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Error recorded on items whose claim expired before the send finished
pub const STALE_CLAIM_ERROR: &str = "Send interrupted before completion";

/// Queue repository trait
///
/// Items move `pending -> processing -> {sent | pending | failed}`. Only
/// `claim_pending` moves items into `processing`, and only items in
/// `processing` can be completed or failed.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Persist a new pending item with zero attempts
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem>;

    /// Get an item by ID
    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>>;

    /// Atomically claim up to `limit` pending items, oldest first, moving
    /// them to `processing` and counting the attempt
    async fn claim_pending(&self, limit: i64) -> Result<Vec<QueueItem>>;

    /// Mark a claimed item as sent
    async fn mark_sent(&self, id: QueueItemId, message_id: Option<&str>) -> Result<bool>;

    /// Record a failed send on a claimed item; it returns to `pending` while
    /// attempts remain and becomes `failed` otherwise
    async fn record_failure(&self, id: QueueItemId, error: &str) -> Result<Option<QueueItem>>;

    /// Return claims older than `older_than` to the retry policy
    async fn release_stale(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Re-open a failed item with a fresh attempt budget
    async fn retry(&self, id: QueueItemId) -> Result<bool>;

    /// Delete an item regardless of status
    async fn delete(&self, id: QueueItemId) -> Result<bool>;

    /// List items, newest first
    async fn list(&self, status: Option<QueueStatus>, limit: i64) -> Result<Vec<QueueItem>>;

    /// Count items by status
    async fn stats(&self) -> Result<QueueStats>;
}

/// PostgreSQL queue repository implementation
pub struct DbQueueRepository {
    pool: DatabasePool,
}

impl DbQueueRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn into_items(rows: Vec<QueueItemRow>) -> Result<Vec<QueueItem>> {
    rows.into_iter().map(QueueItem::try_from).collect()
}

#[async_trait]
impl QueueRepository for DbQueueRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem> {
        item.validate()?;

        let row = sqlx::query_as::<_, QueueItemRow>(
            r#"
            INSERT INTO email_queue (
                id, ticket_id, to_address, to_name, subject, html_body, text_body,
                reply_to, in_reply_to, email_type, status, attempts, max_attempts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', 0, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.ticket_id)
        .bind(&item.to_address)
        .bind(&item.to_name)
        .bind(&item.subject)
        .bind(&item.html_body)
        .bind(&item.text_body)
        .bind(&item.reply_to)
        .bind(&item.in_reply_to)
        .bind(item.email_type.to_string())
        .bind(item.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        QueueItem::try_from(row)
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        sqlx::query_as::<_, QueueItemRow>("SELECT * FROM email_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(QueueItem::try_from)
            .transpose()
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<QueueItem>> {
        // Single statement: rows locked by an overlapping pass are skipped,
        // so each item is claimed by exactly one pass.
        let rows = sqlx::query_as::<_, QueueItemRow>(
            r#"
            UPDATE email_queue SET
                status = 'processing',
                attempts = attempts + 1,
                last_attempt_at = NOW(),
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM email_queue
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut items = into_items(rows)?;
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn mark_sent(&self, id: QueueItemId, message_id: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue SET
                status = 'sent',
                message_id = $2,
                sent_at = NOW(),
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(message_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(&self, id: QueueItemId, error: &str) -> Result<Option<QueueItem>> {
        sqlx::query_as::<_, QueueItemRow>(
            r#"
            UPDATE email_queue SET
                status = CASE
                    WHEN attempts < max_attempts THEN 'pending'
                    ELSE 'failed'
                END,
                error_message = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(QueueItem::try_from)
        .transpose()
    }

    async fn release_stale(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue SET
                status = CASE
                    WHEN attempts < max_attempts THEN 'pending'
                    ELSE 'failed'
                END,
                error_message = $2,
                updated_at = NOW()
            WHERE status = 'processing' AND last_attempt_at < $1
            "#,
        )
        .bind(older_than)
        .bind(STALE_CLAIM_ERROR)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn retry(&self, id: QueueItemId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue SET
                status = 'pending',
                attempts = 0,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: QueueItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_queue WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<QueueStatus>, limit: i64) -> Result<Vec<QueueItem>> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, QueueItemRow>(
                r#"
                SELECT * FROM email_queue
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .fetch_all(self.pool.pool())
            .await
        } else {
            sqlx::query_as::<_, QueueItemRow>(
                r#"
                SELECT * FROM email_queue
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool.pool())
            .await
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        into_items(rows)
    }

    async fn stats(&self) -> Result<QueueStats> {
        sqlx::query_as::<_, QueueStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM email_queue
            "#,
        )
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
