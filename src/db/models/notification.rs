use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery state of a notification.
///
/// `Pending` is the only live state; `Acknowledged` and `Failed` are
/// terminal. `Failed` is reached only when the retry window is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Pending,
    Acknowledged,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Acknowledged => "ACKNOWLEDGED",
            NotificationStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(NotificationStatus::Pending),
            "ACKNOWLEDGED" => Some(NotificationStatus::Acknowledged),
            "FAILED" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// Content type of a published message. Only JSON and XML are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContentType {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/xml")]
    Xml,
}

impl MessageContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageContentType::Json => "application/json",
            MessageContentType::Xml => "application/xml",
        }
    }

    /// Parse from a `Content-Type` header value, ignoring any parameters
    /// such as `; charset=utf-8`.
    pub fn parse(s: &str) -> Option<Self> {
        let mime = s.split(';').next().unwrap_or("").trim();
        match mime {
            "application/json" => Some(MessageContentType::Json),
            "application/xml" | "text/xml" => Some(MessageContentType::Xml),
            _ => None,
        }
    }
}

/// Raw notification row; `message_encrypted` is `nonce || ciphertext`.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub notification_id: String,
    pub box_id: String,
    pub content_type: String,
    pub message_encrypted: Vec<u8>,
    pub status: String,
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
    pub retry_after: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
    pub pushed_at: Option<NaiveDateTime>,
}

/// Data required to persist a freshly published notification. The repository
/// sets `status` to `PENDING` and stamps `created_at` itself.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_id: String,
    pub box_id: String,
    pub content_type: MessageContentType,
    pub message: String,
}

/// A notification with its message body decrypted.
#[derive(Debug, Clone)]
pub struct Notification {
    pub notification_id: String,
    pub box_id: String,
    pub content_type: MessageContentType,
    pub message: String,
    pub status: NotificationStatus,
    /// Number of failed push attempts so far; drives back-off indexing.
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
    /// Next time a push may be attempted; absent means eligible now.
    pub retry_after: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
    pub pushed_at: Option<NaiveDateTime>,
}
