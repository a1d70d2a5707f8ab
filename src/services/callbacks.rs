use std::sync::Arc;

use chrono::Utc;

use crate::db::models::Subscriber;
use crate::db::repository::BoxRepository;
use crate::error::AppResult;
use crate::services::boxes::BoxService;
use crate::services::events::CallbackUrlUpdatedEvent;
use crate::services::gateway::CallbackProbeOutcome;
use crate::AppState;

/// Outcome of a callback-URL update. Ownership and existence failures
/// propagate as errors; these variants are the domain-level results the
/// caller reports back with `successful: true/false`.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackUpdateOutcome {
    Updated,
    ValidationFailed(String),
    UnableToUpdate(String),
}

/// Validates a candidate callback URL with the gateway before binding it to
/// the box, and emits an audit event when the URL actually changes.
pub struct CallbackService;

impl CallbackService {
    pub async fn update_callback_url(
        state: &Arc<AppState>,
        box_id: &str,
        client_id: &str,
        callback_url: &str,
    ) -> AppResult<CallbackUpdateOutcome> {
        let subject = BoxService::get_owned_box(&state.db, box_id, client_id).await?;

        let old_callback_url = match &subject.subscriber {
            Some(Subscriber::Push { callback_url, .. }) => callback_url.clone(),
            _ => String::new(),
        };

        let subscriber = if callback_url.is_empty() {
            // An empty URL deliberately bypasses validation: the caller is
            // clearing the push binding and the box reverts to pull-only.
            Subscriber::Pull {
                subscribed_at: Utc::now().naive_utc(),
            }
        } else {
            match state.gateway.validate_callback(callback_url).await {
                CallbackProbeOutcome::Valid => Subscriber::Push {
                    callback_url: callback_url.to_string(),
                    subscribed_at: Utc::now().naive_utc(),
                },
                CallbackProbeOutcome::Invalid(reason) => {
                    tracing::info!(
                        "Callback URL for box {} rejected by gateway: {}",
                        box_id,
                        reason
                    );
                    return Ok(CallbackUpdateOutcome::ValidationFailed(reason));
                }
            }
        };

        match BoxRepository::update_subscriber(&state.db, box_id, Some(&subscriber)).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Ok(CallbackUpdateOutcome::UnableToUpdate(format!(
                    "Box {} disappeared while updating its subscriber",
                    box_id
                )))
            }
            Err(e) => {
                tracing::error!("Failed to persist subscriber for box {}: {}", box_id, e);
                return Ok(CallbackUpdateOutcome::UnableToUpdate(e.to_string()));
            }
        }

        if old_callback_url != callback_url {
            let event = CallbackUrlUpdatedEvent::new(
                &subject,
                old_callback_url,
                callback_url.to_string(),
            );
            // Audit emission is best-effort; the update already happened.
            if let Err(e) = state.events.publish_callback_updated(&event).await {
                tracing::warn!(
                    "Failed to emit callback-updated audit event for box {}: {}",
                    box_id,
                    e
                );
            }
        }

        Ok(CallbackUpdateOutcome::Updated)
    }
}
