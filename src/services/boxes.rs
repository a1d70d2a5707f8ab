use sqlx::SqlitePool;

use crate::db::models::NotificationBox;
use crate::db::repository::BoxRepository;
use crate::error::{AppError, AppResult};

/// Outcome of a box creation request. Creation is idempotent per
/// `(client_id, box_name)`: a collision hands back the existing box.
#[derive(Debug)]
pub enum CreateBoxOutcome {
    Created(NotificationBox),
    Retrieved(NotificationBox),
}

pub struct BoxService;

impl BoxService {
    pub async fn create_box(
        pool: &SqlitePool,
        box_name: &str,
        client_id: &str,
    ) -> AppResult<CreateBoxOutcome> {
        if box_name.trim().is_empty() || client_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "boxName and clientId must be non-empty".to_string(),
            ));
        }

        if let Some(existing) =
            BoxRepository::find_by_name_and_client(pool, box_name, client_id).await?
        {
            return Ok(CreateBoxOutcome::Retrieved(existing));
        }

        match BoxRepository::insert(pool, box_name, client_id).await? {
            Some(created) => {
                tracing::info!("Created box {} for client {}", created.box_id, client_id);
                Ok(CreateBoxOutcome::Created(created))
            }
            // Lost an insertion race; the winner's box is the result.
            None => BoxRepository::find_by_name_and_client(pool, box_name, client_id)
                .await?
                .map(CreateBoxOutcome::Retrieved)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Box '{}' could not be created for client {}",
                        box_name, client_id
                    ))
                }),
        }
    }

    pub async fn get_box(
        pool: &SqlitePool,
        box_name: &str,
        client_id: &str,
    ) -> AppResult<Option<NotificationBox>> {
        BoxRepository::find_by_name_and_client(pool, box_name, client_id).await
    }

    /// Load a box by id and enforce the ownership contract: the caller's
    /// `client_id` must match the box creator's.
    pub async fn get_owned_box(
        pool: &SqlitePool,
        box_id: &str,
        client_id: &str,
    ) -> AppResult<NotificationBox> {
        let found = BoxRepository::find_by_id(pool, box_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("BoxId: {} not found", box_id)))?;

        if found.client_id != client_id {
            return Err(AppError::Unauthorized(
                "clientId does not match boxCreator".to_string(),
            ));
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_pool;

    #[tokio::test]
    async fn create_is_idempotent_per_client_and_name() {
        let pool = test_pool().await;

        let first = BoxService::create_box(&pool, "orders", "client-a").await.unwrap();
        let created = match first {
            CreateBoxOutcome::Created(b) => b,
            CreateBoxOutcome::Retrieved(_) => panic!("expected a fresh box"),
        };

        let second = BoxService::create_box(&pool, "orders", "client-a").await.unwrap();
        match second {
            CreateBoxOutcome::Retrieved(b) => assert_eq!(b.box_id, created.box_id),
            CreateBoxOutcome::Created(_) => panic!("expected the existing box"),
        }
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let pool = test_pool().await;
        assert!(matches!(
            BoxService::create_box(&pool, "  ", "client-a").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            BoxService::create_box(&pool, "orders", "").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn ownership_is_enforced_on_lookup_by_id() {
        let pool = test_pool().await;
        let created = match BoxService::create_box(&pool, "orders", "client-a").await.unwrap() {
            CreateBoxOutcome::Created(b) => b,
            CreateBoxOutcome::Retrieved(b) => b,
        };

        let owned = BoxService::get_owned_box(&pool, &created.box_id, "client-a").await.unwrap();
        assert_eq!(owned.box_id, created.box_id);

        assert!(matches!(
            BoxService::get_owned_box(&pool, &created.box_id, "client-b").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            BoxService::get_owned_box(&pool, "missing", "client-a").await,
            Err(AppError::NotFound(_))
        ));
    }
}
