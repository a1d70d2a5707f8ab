use std::sync::Arc;

use chrono::NaiveDateTime;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

use crate::db::models::{MessageContentType, Notification, NotificationBox, NotificationStatus};
use crate::error::{AppError, AppResult};
use crate::services::clients::ClientService;
use crate::services::gateway::{ForwardedHeader, OutboundNotification, PushOutcome};
use crate::AppState;

type HmacSha1 = Hmac<Sha1>;

/// Header carried to the customer callback so the receiver can authenticate
/// the push. The gateway forwards it verbatim.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// The JSON document that is both delivered to the callback and signed.
/// The signature covers the exact serialized bytes handed to the gateway.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationEnvelope<'a> {
    notification_id: &'a str,
    box_id: &'a str,
    message_content_type: MessageContentType,
    message: &'a str,
    status: NotificationStatus,
    created_date_time: NaiveDateTime,
}

/// Lowercase-hex HMAC-SHA1 of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to create HMAC")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Builds and dispatches a single signed push through the gateway.
pub struct PushService;

impl PushService {
    /// Push one notification to the box's callback. Every failure mode is
    /// classified into [`PushOutcome::Failed`]; this never errors out.
    pub async fn push(
        state: &Arc<AppState>,
        subject: &NotificationBox,
        notification: &Notification,
    ) -> PushOutcome {
        let destination_url = match subject.push_callback_url() {
            Some(url) => url.to_string(),
            None => {
                return PushOutcome::Failed(format!(
                    "Box {} has no push subscriber with a callback URL",
                    subject.box_id
                ))
            }
        };

        // The box creator's active secret signs the push; the client is
        // created here if this is its first notification.
        let client = match ClientService::find_or_create(&state.db, &subject.client_id).await {
            Ok(client) => client,
            Err(e) => return PushOutcome::Failed(format!("Failed to resolve signing secret: {}", e)),
        };

        let envelope = NotificationEnvelope {
            notification_id: &notification.notification_id,
            box_id: &notification.box_id,
            message_content_type: notification.content_type,
            message: &notification.message,
            status: notification.status,
            created_date_time: notification.created_at,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => return PushOutcome::Failed(format!("Failed to serialize envelope: {}", e)),
        };

        let signature = match sign_payload(client.active_secret(), payload.as_bytes()) {
            Ok(signature) => signature,
            Err(e) => return PushOutcome::Failed(format!("Failed to sign envelope: {}", e)),
        };

        let outbound = OutboundNotification {
            destination_url,
            forwarded_headers: vec![ForwardedHeader {
                key: SIGNATURE_HEADER.to_string(),
                value: signature,
            }],
            payload,
        };

        state.gateway.notify(outbound).await
    }
}
