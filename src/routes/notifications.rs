use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{post, put},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{MessageContentType, Notification, NotificationStatus};
use crate::db::repository::{BoxRepository, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::services::publish::{DeliveryService, PublishOutcome};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/box/:box_id/notifications",
            post(publish_notification).get(list_notifications),
        )
        .route(
            "/box/:box_id/notifications/acknowledge",
            put(acknowledge_notifications),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    pub status: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub notification_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub notification_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub notification_id: String,
    pub box_id: String,
    pub message_content_type: MessageContentType,
    pub message: String,
    pub status: NotificationStatus,
    pub created_date_time: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_date_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_date_time: Option<NaiveDateTime>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            notification_id: n.notification_id,
            box_id: n.box_id,
            message_content_type: n.content_type,
            message: n.message,
            status: n.status,
            created_date_time: n.created_at,
            read_date_time: n.read_at,
            pushed_date_time: n.pushed_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Ingest one notification. The body is stored as received; only the
/// declared content type is inspected.
async fn publish_notification(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<PublishResponse>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(MessageContentType::parse)
        .ok_or_else(|| {
            AppError::UnsupportedMediaType(
                "Content-Type must be application/json or application/xml".to_string(),
            )
        })?;

    let message = String::from_utf8(body.to_vec())
        .map_err(|_| AppError::BadRequest("Message body must be valid UTF-8".to_string()))?;
    if message.is_empty() {
        return Err(AppError::BadRequest("Message body must not be empty".to_string()));
    }

    let notification_id = Uuid::new_v4().to_string();
    match DeliveryService::save_and_maybe_push(&state, &box_id, &notification_id, content_type, message)
        .await?
    {
        PublishOutcome::Published(notification) => Ok((
            StatusCode::CREATED,
            Json(PublishResponse {
                notification_id: notification.notification_id,
            }),
        )),
        PublishOutcome::Duplicate { notification_id } => {
            Ok((StatusCode::OK, Json(PublishResponse { notification_id })))
        }
    }
}

/// Filtered listing of a box's notifications, oldest first.
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<String>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    BoxRepository::find_by_id(&state.db, &box_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("BoxId: {} not found", box_id)))?;

    let status = query
        .status
        .as_deref()
        .map(|raw| {
            NotificationStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid status value: {}", raw)))
        })
        .transpose()?;
    let from = query
        .from_date
        .as_deref()
        .map(|raw| parse_datetime(raw, "fromDate"))
        .transpose()?;
    let to = query
        .to_date
        .as_deref()
        .map(|raw| parse_datetime(raw, "toDate"))
        .transpose()?;

    let notifications = NotificationRepository::list_by_box(
        &state.db,
        &state.cipher,
        &box_id,
        status,
        from,
        to,
        state.config.notifications.max_per_request,
    )
    .await?;

    Ok(Json(
        notifications.into_iter().map(NotificationResponse::from).collect(),
    ))
}

/// Terminal pull-side acknowledgement of a set of notifications.
async fn acknowledge_notifications(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<String>,
    Json(request): Json<AcknowledgeRequest>,
) -> AppResult<StatusCode> {
    if request.notification_ids.is_empty() {
        return Err(AppError::BadRequest(
            "notificationIds must be non-empty".to_string(),
        ));
    }

    BoxRepository::find_by_id(&state.db, &box_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("BoxId: {} not found", box_id)))?;

    NotificationRepository::acknowledge(&state.db, &box_id, &request.notification_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts RFC 3339 or a bare ISO date-time (`2026-01-01T00:00:00`).
fn parse_datetime(raw: &str, param: &str) -> AppResult<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    raw.parse::<NaiveDateTime>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} value: {}", param, raw)))
}
