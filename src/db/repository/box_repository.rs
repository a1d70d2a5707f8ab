use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{BoxRow, NotificationBox, Subscriber};
use crate::db::repository::is_unique_violation;
use crate::error::{AppError, AppResult};

/// Repository for boxes.
///
/// `(box_name, client_id)` carries a unique index; insertion races collapse
/// into the create-or-retrieve flow at the service layer.
pub struct BoxRepository;

impl BoxRepository {
    /// Insert a new box with a server-assigned id and no subscriber.
    /// Returns `None` when a box with the same name already exists for the
    /// client.
    pub async fn insert(
        pool: &SqlitePool,
        box_name: &str,
        client_id: &str,
    ) -> AppResult<Option<NotificationBox>> {
        let box_id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let res = sqlx::query_as::<_, BoxRow>(
            r#"
            INSERT INTO boxes (
                box_id,
                box_name,
                client_id,
                application_id,
                subscription_type,
                callback_url,
                subscribed_at,
                created_at
            ) VALUES (?, ?, ?, NULL, NULL, NULL, NULL, ?)
            RETURNING
                box_id,
                box_name,
                client_id,
                application_id,
                subscription_type,
                callback_url,
                subscribed_at,
                created_at
            "#,
        )
        .bind(box_id)
        .bind(box_name)
        .bind(client_id)
        .bind(now)
        .fetch_one(pool)
        .await;

        match res {
            Ok(row) => Ok(Some(row.into_domain())),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    pub async fn find_by_name_and_client(
        pool: &SqlitePool,
        box_name: &str,
        client_id: &str,
    ) -> AppResult<Option<NotificationBox>> {
        let row = sqlx::query_as::<_, BoxRow>(
            r#"
            SELECT
                box_id,
                box_name,
                client_id,
                application_id,
                subscription_type,
                callback_url,
                subscribed_at,
                created_at
            FROM boxes
            WHERE box_name = ? AND client_id = ?
            "#,
        )
        .bind(box_name)
        .bind(client_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(BoxRow::into_domain))
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        box_id: &str,
    ) -> AppResult<Option<NotificationBox>> {
        let row = sqlx::query_as::<_, BoxRow>(
            r#"
            SELECT
                box_id,
                box_name,
                client_id,
                application_id,
                subscription_type,
                callback_url,
                subscribed_at,
                created_at
            FROM boxes
            WHERE box_id = ?
            "#,
        )
        .bind(box_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(BoxRow::into_domain))
    }

    /// Replace the box's subscriber in a single statement. `None` clears the
    /// subscriber entirely. Returns the updated box, or `None` when the box
    /// does not exist.
    pub async fn update_subscriber(
        pool: &SqlitePool,
        box_id: &str,
        subscriber: Option<&Subscriber>,
    ) -> AppResult<Option<NotificationBox>> {
        let subscription_type = subscriber.map(Subscriber::type_column);
        let callback_url = match subscriber {
            Some(Subscriber::Push { callback_url, .. }) => Some(callback_url.clone()),
            _ => None,
        };
        let subscribed_at = match subscriber {
            Some(Subscriber::Push { subscribed_at, .. })
            | Some(Subscriber::Pull { subscribed_at }) => Some(*subscribed_at),
            None => None,
        };

        let row = sqlx::query_as::<_, BoxRow>(
            r#"
            UPDATE boxes
            SET subscription_type = ?, callback_url = ?, subscribed_at = ?
            WHERE box_id = ?
            RETURNING
                box_id,
                box_name,
                client_id,
                application_id,
                subscription_type,
                callback_url,
                subscribed_at,
                created_at
            "#,
        )
        .bind(subscription_type)
        .bind(callback_url)
        .bind(subscribed_at)
        .bind(box_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(BoxRow::into_domain))
    }
}
