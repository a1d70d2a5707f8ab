use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::SqlitePool;

use crate::db::models::Client;
use crate::db::repository::ClientRepository;
use crate::error::{AppError, AppResult};

const SECRET_BYTES: usize = 32;

/// Lazy creation and lookup of API clients and their signing secrets.
pub struct ClientService;

impl ClientService {
    /// Return the client, creating it with a fresh signing secret on first
    /// reference. Idempotent: a lost creation race re-reads the winner.
    pub async fn find_or_create(pool: &SqlitePool, client_id: &str) -> AppResult<Client> {
        if let Some(client) = ClientRepository::find(pool, client_id).await? {
            return Ok(client);
        }

        let secret = generate_secret();
        match ClientRepository::insert(pool, client_id, &[secret]).await? {
            Some(client) => {
                tracing::info!("Created client {} on first reference", client_id);
                Ok(client)
            }
            None => ClientRepository::find(pool, client_id).await?.ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "client {} vanished after losing a creation race",
                    client_id
                ))
            }),
        }
    }

    pub async fn get_secrets(pool: &SqlitePool, client_id: &str) -> AppResult<Option<Vec<String>>> {
        Ok(ClientRepository::find(pool, client_id).await?.map(|c| c.secrets))
    }
}

/// A fresh 256-bit secret, URL-safe base64 encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_pool;

    #[test]
    fn secrets_are_url_safe_and_distinct() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 chars without padding.
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let pool = test_pool().await;

        let first = ClientService::find_or_create(&pool, "client-a").await.unwrap();
        let second = ClientService::find_or_create(&pool, "client-a").await.unwrap();
        assert_eq!(first.secrets, second.secrets);
        assert_eq!(first.secrets.len(), 1);

        let secrets = ClientService::get_secrets(&pool, "client-a").await.unwrap().unwrap();
        assert_eq!(secrets, first.secrets);
        assert!(ClientService::get_secrets(&pool, "unknown").await.unwrap().is_none());
    }
}
