use chrono::{NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::crypto::MessageCipher;
use crate::db::models::{
    BoxRow, MessageContentType, NewNotification, Notification, NotificationBox, NotificationRow,
    NotificationStatus,
};
use crate::db::repository::is_unique_violation;
use crate::error::{AppError, AppResult};

const TTL_META_KEY: &str = "notification_ttl_seconds";

const NOTIFICATION_COLUMNS: &str = r#"
    notification_id,
    box_id,
    content_type,
    message_encrypted,
    status,
    retry_count,
    created_at,
    retry_after,
    read_at,
    pushed_at
"#;

/// Repository for the durable notification store.
///
/// Implementation notes:
/// - Message bodies are encrypted before they hit a statement and decrypted
///   on the way out; ciphertext never leaves this module.
/// - `(notification_id, box_id)` is the primary key, so a duplicate publish
///   surfaces as a unique violation and is returned as `None`.
/// - Status transitions are guarded with `AND status = 'PENDING'`, which
///   keeps `ACKNOWLEDGED` and `FAILED` absorbing even with several writers.
pub struct NotificationRepository;

impl NotificationRepository {
    /// Persist a new notification in `PENDING` state. Returns `None` when a
    /// row for `(notification_id, box_id)` already exists.
    pub async fn save(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        new: &NewNotification,
    ) -> AppResult<Option<Notification>> {
        let now = Utc::now().naive_utc();
        let encrypted = cipher.encrypt(&new.message)?;

        let res = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notifications (
                notification_id,
                box_id,
                content_type,
                message_encrypted,
                status,
                retry_count,
                created_at,
                retry_after,
                read_at,
                pushed_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, NULL, NULL, NULL)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(&new.notification_id)
        .bind(&new.box_id)
        .bind(new.content_type.as_str())
        .bind(encrypted)
        .bind(NotificationStatus::Pending.as_str())
        .bind(now)
        .fetch_one(pool)
        .await;

        match res {
            Ok(row) => to_domain(row, cipher).map(Some),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    pub async fn find(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        notification_id: &str,
    ) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = ?"
        ))
        .bind(notification_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(|r| to_domain(r, cipher)).transpose()
    }

    /// Filtered listing, ascending by creation time. `from`/`to` are
    /// inclusive bounds on `created_at`.
    pub async fn list_by_box(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        box_id: &str,
        status: Option<NotificationStatus>,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE box_id = "
        ));
        qb.push_bind(box_id);
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY created_at ASC LIMIT ").push_bind(limit);

        let rows: Vec<NotificationRow> = qb
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        rows.into_iter().map(|r| to_domain(r, cipher)).collect()
    }

    /// Acknowledge the given notifications of a box, skipping any that are
    /// no longer `PENDING`. A modified count below the requested count is
    /// logged but still reported as success; only storage failures err.
    pub async fn acknowledge(
        pool: &SqlitePool,
        box_id: &str,
        notification_ids: &[String],
    ) -> AppResult<bool> {
        if notification_ids.is_empty() {
            return Ok(true);
        }

        let now = Utc::now().naive_utc();
        let mut qb = QueryBuilder::<Sqlite>::new(
            "UPDATE notifications SET status = 'ACKNOWLEDGED', read_at = ",
        );
        qb.push_bind(now);
        qb.push(" WHERE box_id = ").push_bind(box_id);
        qb.push(" AND status = 'PENDING' AND notification_id IN (");
        let mut separated = qb.separated(", ");
        for id in notification_ids {
            separated.push_bind(id);
        }
        qb.push(")");

        let result = qb.build().execute(pool).await.map_err(AppError::Database)?;

        if result.rows_affected() < notification_ids.len() as u64 {
            tracing::warn!(
                "Acknowledge on box {} modified {} of {} requested notifications",
                box_id,
                result.rows_affected(),
                notification_ids.len()
            );
        }

        Ok(true)
    }

    /// Move a pending notification to `status`, returning the post-image.
    /// Terminal rows are left untouched. `pushed_at` is stamped when the
    /// transition is a push acknowledgement.
    pub async fn update_status(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        notification_id: &str,
        status: NotificationStatus,
    ) -> AppResult<Option<Notification>> {
        let pushed_at = match status {
            NotificationStatus::Acknowledged => Some(Utc::now().naive_utc()),
            _ => None,
        };

        sqlx::query(
            r#"
            UPDATE notifications
            SET status = ?, pushed_at = COALESCE(?, pushed_at)
            WHERE notification_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(status.as_str())
        .bind(pushed_at)
        .bind(notification_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find(pool, cipher, notification_id).await
    }

    /// Record a failed push attempt: bump the attempt counter and schedule
    /// the next eligible push time. Only `PENDING` rows are touched.
    pub async fn schedule_retry(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        notification_id: &str,
        next_retry: NaiveDateTime,
    ) -> AppResult<Option<Notification>> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET retry_after = ?, retry_count = retry_count + 1
            WHERE notification_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(next_retry)
        .bind(notification_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find(pool, cipher, notification_id).await
    }

    /// One bounded batch of retry-eligible notifications joined with their
    /// push-subscribed boxes. Calling again after processing a batch yields
    /// the next eligible set, so a sweep drains the store without ever
    /// holding more than `limit` rows in memory.
    pub async fn fetch_retryable(
        pool: &SqlitePool,
        cipher: &MessageCipher,
        limit: i64,
    ) -> AppResult<Vec<(Notification, NotificationBox)>> {
        let now = Utc::now().naive_utc();

        let rows = sqlx::query_as::<_, RetryableRow>(
            r#"
            SELECT
                n.notification_id,
                n.box_id,
                n.content_type,
                n.message_encrypted,
                n.status,
                n.retry_count,
                n.created_at,
                n.retry_after,
                n.read_at,
                n.pushed_at,
                b.box_name,
                b.client_id,
                b.application_id,
                b.subscription_type,
                b.callback_url,
                b.subscribed_at,
                b.created_at AS box_created_at
            FROM notifications n
            JOIN boxes b ON b.box_id = n.box_id
            WHERE n.status = 'PENDING'
              AND (n.retry_after IS NULL OR n.retry_after <= ?)
              AND b.subscription_type = 'push'
              AND b.callback_url IS NOT NULL
              AND b.callback_url != ''
            ORDER BY n.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(|r| r.split(cipher)).collect()
    }

    /// Physically delete notifications older than the TTL. Returns the
    /// number of rows removed.
    pub async fn purge_expired(pool: &SqlitePool, ttl_seconds: u64) -> AppResult<u64> {
        let cutoff = Utc::now().naive_utc() - chrono::Duration::seconds(ttl_seconds as i64);
        let result = sqlx::query("DELETE FROM notifications WHERE created_at <= ?")
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Reconcile the TTL the store has declared with the configured value,
    /// replacing the declaration when they disagree. Run at startup.
    pub async fn ensure_ttl(pool: &SqlitePool, ttl_seconds: u64) -> AppResult<()> {
        let configured = ttl_seconds.to_string();
        let declared: Option<(String,)> =
            sqlx::query_as("SELECT meta_value FROM store_meta WHERE meta_key = ?")
                .bind(TTL_META_KEY)
                .fetch_optional(pool)
                .await
                .map_err(AppError::Database)?;

        match declared {
            Some((value,)) if value == configured => {}
            Some((value,)) => {
                tracing::info!(
                    "Notification TTL declaration is {}s but configuration says {}s; replacing",
                    value,
                    configured
                );
                sqlx::query("UPDATE store_meta SET meta_value = ? WHERE meta_key = ?")
                    .bind(&configured)
                    .bind(TTL_META_KEY)
                    .execute(pool)
                    .await
                    .map_err(AppError::Database)?;
            }
            None => {
                sqlx::query("INSERT INTO store_meta (meta_key, meta_value) VALUES (?, ?)")
                    .bind(TTL_META_KEY)
                    .bind(&configured)
                    .execute(pool)
                    .await
                    .map_err(AppError::Database)?;
            }
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn declared_ttl(pool: &SqlitePool) -> Option<String> {
        sqlx::query_as::<_, (String,)>("SELECT meta_value FROM store_meta WHERE meta_key = ?")
            .bind(TTL_META_KEY)
            .fetch_optional(pool)
            .await
            .unwrap()
            .map(|(v,)| v)
    }
}

fn to_domain(row: NotificationRow, cipher: &MessageCipher) -> AppResult<Notification> {
    let status = NotificationStatus::parse(&row.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "notification {} has unknown status '{}'",
            row.notification_id,
            row.status
        ))
    })?;
    let content_type = MessageContentType::parse(&row.content_type).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "notification {} has unknown content type '{}'",
            row.notification_id,
            row.content_type
        ))
    })?;
    let message = cipher.decrypt(&row.message_encrypted)?;

    Ok(Notification {
        notification_id: row.notification_id,
        box_id: row.box_id,
        content_type,
        message,
        status,
        retry_count: row.retry_count,
        created_at: row.created_at,
        retry_after: row.retry_after,
        read_at: row.read_at,
        pushed_at: row.pushed_at,
    })
}

/// Flattened join row for the retry sweep.
#[derive(sqlx::FromRow)]
struct RetryableRow {
    notification_id: String,
    box_id: String,
    content_type: String,
    message_encrypted: Vec<u8>,
    status: String,
    retry_count: i32,
    created_at: NaiveDateTime,
    retry_after: Option<NaiveDateTime>,
    read_at: Option<NaiveDateTime>,
    pushed_at: Option<NaiveDateTime>,
    box_name: String,
    client_id: String,
    application_id: Option<String>,
    subscription_type: Option<String>,
    callback_url: Option<String>,
    subscribed_at: Option<NaiveDateTime>,
    box_created_at: NaiveDateTime,
}

impl RetryableRow {
    fn split(self, cipher: &MessageCipher) -> AppResult<(Notification, NotificationBox)> {
        let box_row = BoxRow {
            box_id: self.box_id.clone(),
            box_name: self.box_name,
            client_id: self.client_id,
            application_id: self.application_id,
            subscription_type: self.subscription_type,
            callback_url: self.callback_url,
            subscribed_at: self.subscribed_at,
            created_at: self.box_created_at,
        };
        let notification_row = NotificationRow {
            notification_id: self.notification_id,
            box_id: self.box_id,
            content_type: self.content_type,
            message_encrypted: self.message_encrypted,
            status: self.status,
            retry_count: self.retry_count,
            created_at: self.created_at,
            retry_after: self.retry_after,
            read_at: self.read_at,
            pushed_at: self.pushed_at,
        };
        Ok((to_domain(notification_row, cipher)?, box_row.into_domain()))
    }
}
