use std::sync::Arc;

use crate::db::models::{MessageContentType, NewNotification, Notification, NotificationStatus};
use crate::db::repository::{BoxRepository, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::services::gateway::PushOutcome;
use crate::services::push::PushService;
use crate::AppState;

/// Outcome of a publish. Duplicates are suppressed, not errors: the earlier
/// publish of the same notification already holds the payload.
#[derive(Debug)]
pub enum PublishOutcome {
    Published(Notification),
    Duplicate { notification_id: String },
}

/// Single entry point for new notifications: persist, then push best-effort
/// when the box has a push subscriber.
pub struct DeliveryService;

impl DeliveryService {
    pub async fn save_and_maybe_push(
        state: &Arc<AppState>,
        box_id: &str,
        notification_id: &str,
        content_type: MessageContentType,
        message: String,
    ) -> AppResult<PublishOutcome> {
        let subject = BoxRepository::find_by_id(&state.db, box_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("BoxId: {} not found", box_id)))?;

        let new = NewNotification {
            notification_id: notification_id.to_string(),
            box_id: box_id.to_string(),
            content_type,
            message,
        };

        let saved = match NotificationRepository::save(&state.db, &state.cipher, &new).await? {
            Some(saved) => saved,
            None => {
                tracing::info!(
                    "Notification {} already exists in box {}; suppressing duplicate",
                    notification_id,
                    box_id
                );
                return Ok(PublishOutcome::Duplicate {
                    notification_id: notification_id.to_string(),
                });
            }
        };

        if subject.push_callback_url().is_some() {
            match PushService::push(state, &subject, &saved).await {
                PushOutcome::Delivered => {
                    // A storage hiccup here leaves the row PENDING; the
                    // sweeper re-pushes, which at-least-once permits.
                    if let Err(e) = NotificationRepository::update_status(
                        &state.db,
                        &state.cipher,
                        &saved.notification_id,
                        NotificationStatus::Acknowledged,
                    )
                    .await
                    {
                        tracing::warn!(
                            "Pushed notification {} but failed to acknowledge it: {}",
                            saved.notification_id,
                            e
                        );
                    }
                }
                PushOutcome::Failed(reason) => {
                    tracing::warn!(
                        "Push of notification {} failed at ingest: {}; leaving it pending for the retry sweeper",
                        saved.notification_id,
                        reason
                    );
                }
            }
        }

        Ok(PublishOutcome::Published(saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::db::models::Subscriber;
    use crate::services::clients::ClientService;
    use crate::services::push::{sign_payload, SIGNATURE_HEADER};
    use crate::services::testing::{test_state, RecordingEvents, ScriptedGateway};

    async fn seed_push_box(state: &Arc<AppState>, url: &str) -> String {
        let b = BoxRepository::insert(&state.db, "orders", "client-a")
            .await
            .unwrap()
            .unwrap();
        BoxRepository::update_subscriber(
            &state.db,
            &b.box_id,
            Some(&Subscriber::Push {
                callback_url: url.to_string(),
                subscribed_at: Utc::now().naive_utc(),
            }),
        )
        .await
        .unwrap();
        b.box_id
    }

    #[tokio::test]
    async fn happy_path_push_signs_and_acknowledges() {
        let gateway = ScriptedGateway::delivering();
        let state = test_state(gateway.clone(), RecordingEvents::working()).await;
        let box_id = seed_push_box(&state, "https://x/cb").await;

        let outcome = DeliveryService::save_and_maybe_push(
            &state,
            &box_id,
            "n1",
            MessageContentType::Json,
            r#"{"a":1}"#.to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, PublishOutcome::Published(_)));

        // Exactly one gateway call, aimed at the subscriber's URL.
        assert_eq!(gateway.notify_count(), 1);
        let outbound = gateway.notify_calls.lock().unwrap()[0].clone();
        assert_eq!(outbound.destination_url, "https://x/cb");

        // The envelope carries the payload verbatim and the forwarded
        // signature is the HMAC of exactly those bytes under the client's
        // active secret.
        let envelope: serde_json::Value = serde_json::from_str(&outbound.payload).unwrap();
        assert_eq!(envelope["notificationId"], "n1");
        assert_eq!(envelope["message"], r#"{"a":1}"#);

        let secrets = ClientService::get_secrets(&state.db, "client-a")
            .await
            .unwrap()
            .unwrap();
        let expected = sign_payload(&secrets[0], outbound.payload.as_bytes()).unwrap();
        assert_eq!(outbound.forwarded_headers.len(), 1);
        assert_eq!(outbound.forwarded_headers[0].key, SIGNATURE_HEADER);
        assert_eq!(outbound.forwarded_headers[0].value, expected);

        let stored = NotificationRepository::find(&state.db, &state.cipher, "n1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, NotificationStatus::Acknowledged);
        assert!(stored.pushed_at.is_some());
    }

    #[tokio::test]
    async fn failed_ingest_push_leaves_notification_pending() {
        let gateway = ScriptedGateway::delivering();
        gateway.script_notify([PushOutcome::Failed("gateway said no".to_string())]);
        let state = test_state(gateway.clone(), RecordingEvents::working()).await;
        let box_id = seed_push_box(&state, "https://x/cb").await;

        let outcome = DeliveryService::save_and_maybe_push(
            &state,
            &box_id,
            "n1",
            MessageContentType::Json,
            "{}".to_string(),
        )
        .await
        .unwrap();

        // The publish itself succeeds; recovery belongs to the sweeper.
        assert!(matches!(outcome, PublishOutcome::Published(_)));
        let stored = NotificationRepository::find(&state.db, &state.cipher, "n1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
        assert!(stored.retry_after.is_none());
    }

    #[tokio::test]
    async fn pull_only_box_skips_the_gateway() {
        let gateway = ScriptedGateway::delivering();
        let state = test_state(gateway.clone(), RecordingEvents::working()).await;
        let b = BoxRepository::insert(&state.db, "orders", "client-a")
            .await
            .unwrap()
            .unwrap();

        let outcome = DeliveryService::save_and_maybe_push(
            &state,
            &b.box_id,
            "n1",
            MessageContentType::Xml,
            "<a/>".to_string(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, PublishOutcome::Published(_)));
        assert_eq!(gateway.notify_count(), 0);
        let stored = NotificationRepository::find(&state.db, &state.cipher, "n1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
        assert_eq!(stored.content_type, MessageContentType::Xml);
        assert_eq!(stored.message, "<a/>");
    }

    #[tokio::test]
    async fn duplicate_publish_is_suppressed_without_a_second_push() {
        let gateway = ScriptedGateway::delivering();
        let state = test_state(gateway.clone(), RecordingEvents::working()).await;
        let box_id = seed_push_box(&state, "https://x/cb").await;

        DeliveryService::save_and_maybe_push(
            &state,
            &box_id,
            "n1",
            MessageContentType::Json,
            "{}".to_string(),
        )
        .await
        .unwrap();

        let second = DeliveryService::save_and_maybe_push(
            &state,
            &box_id,
            "n1",
            MessageContentType::Json,
            "{}".to_string(),
        )
        .await
        .unwrap();

        match second {
            PublishOutcome::Duplicate { notification_id } => assert_eq!(notification_id, "n1"),
            PublishOutcome::Published(_) => panic!("duplicate must be suppressed"),
        }
        assert_eq!(gateway.notify_count(), 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn unknown_box_stores_nothing() {
        let gateway = ScriptedGateway::delivering();
        let state = test_state(gateway.clone(), RecordingEvents::working()).await;

        let res = DeliveryService::save_and_maybe_push(
            &state,
            "missing",
            "n1",
            MessageContentType::Json,
            "{}".to_string(),
        )
        .await;
        assert!(matches!(res, Err(AppError::NotFound(_))));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        assert_eq!(gateway.notify_count(), 0);
    }
}
