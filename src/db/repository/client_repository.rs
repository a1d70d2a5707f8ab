use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{Client, ClientRow};
use crate::db::repository::is_unique_violation;
use crate::error::{AppError, AppResult};

pub struct ClientRepository;

impl ClientRepository {
    pub async fn find(pool: &SqlitePool, client_id: &str) -> AppResult<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT client_id, secrets_json, created_at
            FROM clients
            WHERE client_id = ?
            "#,
        )
        .bind(client_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(to_domain).transpose()
    }

    /// Insert a client with its initial secret list. Returns `None` when the
    /// client already exists (lost a creation race); the caller re-reads.
    pub async fn insert(
        pool: &SqlitePool,
        client_id: &str,
        secrets: &[String],
    ) -> AppResult<Option<Client>> {
        if secrets.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "refusing to persist client {} with no secrets",
                client_id
            )));
        }

        let secrets_json = serde_json::to_string(secrets)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        let now = Utc::now().naive_utc();

        let res = sqlx::query_as::<_, ClientRow>(
            r#"
            INSERT INTO clients (client_id, secrets_json, created_at)
            VALUES (?, ?, ?)
            RETURNING client_id, secrets_json, created_at
            "#,
        )
        .bind(client_id)
        .bind(secrets_json)
        .bind(now)
        .fetch_one(pool)
        .await;

        match res {
            Ok(row) => to_domain(row).map(Some),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }
}

fn to_domain(row: ClientRow) -> AppResult<Client> {
    let secrets: Vec<String> = serde_json::from_str(&row.secrets_json)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    if secrets.is_empty() {
        return Err(AppError::Internal(anyhow::anyhow!(
            "client {} has an empty secret list",
            row.client_id
        )));
    }
    Ok(Client {
        client_id: row.client_id,
        secrets,
        created_at: row.created_at,
    })
}
