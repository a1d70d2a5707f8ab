use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::EventsConfig;
use crate::db::models::NotificationBox;
use crate::error::{AppError, AppResult};

pub const CALLBACK_UPDATED_EVENT_TYPE: &str = "PPNS_CALLBACK_URI_UPDATED";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActor {
    pub id: String,
    pub actor_type: String,
}

/// Audit record emitted when a box's callback URL changes. The hub has no
/// end-user identity for the caller, so the actor is reported as unknown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackUrlUpdatedEvent {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub event_date_time: NaiveDateTime,
    pub old_callback_url: String,
    pub new_callback_url: String,
    pub box_id: String,
    pub box_name: String,
    pub actor: EventActor,
    pub event_type: String,
}

impl CallbackUrlUpdatedEvent {
    pub fn new(subject: &NotificationBox, old_callback_url: String, new_callback_url: String) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            application_id: subject.application_id.clone(),
            event_date_time: Utc::now().naive_utc(),
            old_callback_url,
            new_callback_url,
            box_id: subject.box_id.clone(),
            box_name: subject.box_name.clone(),
            actor: EventActor {
                id: String::new(),
                actor_type: "UNKNOWN".to_string(),
            },
            event_type: CALLBACK_UPDATED_EVENT_TYPE.to_string(),
        }
    }
}

/// Outbound sink for audit events. Emission failures never fail the
/// operation that produced the event; callers log and continue.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish_callback_updated(&self, event: &CallbackUrlUpdatedEvent) -> AppResult<()>;
}

pub struct EventsClient {
    http: reqwest::Client,
    base_url: String,
}

impl EventsClient {
    pub fn new(config: &EventsConfig, timeout_seconds: u64) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_platform_events_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for EventsClient {
    async fn publish_callback_updated(&self, event: &CallbackUrlUpdatedEvent) -> AppResult<()> {
        let response = self
            .http
            .post(format!("{}/application-events/ppnsCallbackUriUpdated", self.base_url))
            .json(event)
            .send()
            .await?;

        // The sink acknowledges with 201; anything else is a failed emission.
        if response.status() == reqwest::StatusCode::CREATED {
            Ok(())
        } else {
            Err(AppError::Internal(anyhow::anyhow!(
                "events sink responded with {}",
                response.status()
            )))
        }
    }
}
