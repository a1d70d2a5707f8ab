use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::models::{NotificationBox, Subscriber};
use crate::error::{AppError, AppResult};
use crate::services::boxes::{BoxService, CreateBoxOutcome};
use crate::services::callbacks::{CallbackService, CallbackUpdateOutcome};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/box", put(create_box).get(get_box))
        .route("/box/:box_id/callback", put(update_callback_url))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoxRequest {
    pub box_name: String,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxQuery {
    pub box_name: String,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCallbackUrlRequest {
    pub client_id: String,
    pub callback_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxCreatorResponse {
    pub client_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberResponse {
    pub subscription_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub subscribed_date_time: NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxResponse {
    pub box_id: String,
    pub box_name: String,
    pub box_creator: BoxCreatorResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<SubscriberResponse>,
}

impl From<NotificationBox> for BoxResponse {
    fn from(subject: NotificationBox) -> Self {
        let subscriber = subject.subscriber.map(|s| match s {
            Subscriber::Push {
                callback_url,
                subscribed_at,
            } => SubscriberResponse {
                subscription_type: "push".to_string(),
                callback_url: Some(callback_url),
                subscribed_date_time: subscribed_at,
            },
            Subscriber::Pull { subscribed_at } => SubscriberResponse {
                subscription_type: "pull".to_string(),
                callback_url: None,
                subscribed_date_time: subscribed_at,
            },
        });

        BoxResponse {
            box_id: subject.box_id,
            box_name: subject.box_name,
            box_creator: BoxCreatorResponse {
                client_id: subject.client_id,
            },
            application_id: subject.application_id,
            subscriber,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackUpdateResponse {
    pub successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a box, or hand back the existing one for this (client, name) pair.
async fn create_box(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBoxRequest>,
) -> AppResult<(StatusCode, Json<BoxResponse>)> {
    match BoxService::create_box(&state.db, &request.box_name, &request.client_id).await? {
        CreateBoxOutcome::Created(subject) => {
            Ok((StatusCode::CREATED, Json(BoxResponse::from(subject))))
        }
        CreateBoxOutcome::Retrieved(subject) => {
            Ok((StatusCode::OK, Json(BoxResponse::from(subject))))
        }
    }
}

async fn get_box(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GetBoxQuery>,
) -> AppResult<Json<BoxResponse>> {
    let subject = BoxService::get_box(&state.db, &query.box_name, &query.client_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Box '{}' not found for client {}",
                query.box_name, query.client_id
            ))
        })?;
    Ok(Json(BoxResponse::from(subject)))
}

/// Validate and replace the box's callback URL. Domain-level failures come
/// back as `200 {successful:false, errorMessage}`; ownership and existence
/// failures surface as 401/404.
async fn update_callback_url(
    State(state): State<Arc<AppState>>,
    Path(box_id): Path<String>,
    Json(request): Json<UpdateCallbackUrlRequest>,
) -> AppResult<Json<CallbackUpdateResponse>> {
    let outcome = CallbackService::update_callback_url(
        &state,
        &box_id,
        &request.client_id,
        &request.callback_url,
    )
    .await?;

    let response = match outcome {
        CallbackUpdateOutcome::Updated => CallbackUpdateResponse {
            successful: true,
            error_message: None,
        },
        CallbackUpdateOutcome::ValidationFailed(message)
        | CallbackUpdateOutcome::UnableToUpdate(message) => CallbackUpdateResponse {
            successful: false,
            error_message: Some(message),
        },
    };
    Ok(Json(response))
}
