use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::AppResult;

/// A header the gateway passes through verbatim to the customer callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedHeader {
    pub key: String,
    pub value: String,
}

/// The unit of work handed to the push gateway: where to deliver, which
/// headers to forward, and the exact payload bytes that were signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundNotification {
    pub destination_url: String,
    pub forwarded_headers: Vec<ForwardedHeader>,
    pub payload: String,
}

/// Classified result of a push attempt. Transport errors, timeouts, and
/// gateway-reported failures all collapse into `Failed`; nothing is thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    Failed(String),
}

/// Classified result of a callback-URL probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackProbeOutcome {
    Valid,
    Invalid(String),
}

/// The two RPCs the hub consumes from the external push gateway.
#[async_trait]
pub trait NotificationGateway: Send + Sync + 'static {
    async fn notify(&self, outbound: OutboundNotification) -> PushOutcome;
    async fn validate_callback(&self, callback_url: &str) -> CallbackProbeOutcome;
}

#[derive(Debug, Deserialize)]
struct NotifyResponse {
    successful: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateCallbackResponse {
    successful: bool,
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateCallbackRequest<'a> {
    callback_url: &'a str,
}

/// reqwest-backed gateway client. Both endpoints carry the configured
/// `Authorization` token and a JSON body; the per-request timeout comes from
/// configuration and a timeout counts as a failed push, not an error.
pub struct PushGateway {
    http: reqwest::Client,
    outbound_url: String,
    auth_token: String,
}

impl PushGateway {
    pub fn new(config: &GatewayConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            outbound_url: config.outbound_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, reqwest::Error> {
        self.http
            .post(format!("{}{}", self.outbound_url, path))
            .header(reqwest::header::AUTHORIZATION, &self.auth_token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json::<R>()
            .await
    }
}

#[async_trait]
impl NotificationGateway for PushGateway {
    async fn notify(&self, outbound: OutboundNotification) -> PushOutcome {
        match self.post_json::<_, NotifyResponse>("/notify", &outbound).await {
            Ok(NotifyResponse { successful: true }) => PushOutcome::Delivered,
            Ok(NotifyResponse { successful: false }) => PushOutcome::Failed(
                "PPNS Gateway was unable to successfully deliver notification".to_string(),
            ),
            Err(e) => PushOutcome::Failed(e.to_string()),
        }
    }

    async fn validate_callback(&self, callback_url: &str) -> CallbackProbeOutcome {
        let request = ValidateCallbackRequest { callback_url };
        match self
            .post_json::<_, ValidateCallbackResponse>("/validate-callback", &request)
            .await
        {
            Ok(response) if response.successful => CallbackProbeOutcome::Valid,
            Ok(response) => CallbackProbeOutcome::Invalid(
                response
                    .error_message
                    .unwrap_or_else(|| "Unknown Error".to_string()),
            ),
            Err(e) => CallbackProbeOutcome::Invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_notification_uses_protocol_field_names() {
        let outbound = OutboundNotification {
            destination_url: "https://consumer.example/cb".to_string(),
            forwarded_headers: vec![ForwardedHeader {
                key: "X-Hub-Signature".to_string(),
                value: "deadbeef".to_string(),
            }],
            payload: "{}".to_string(),
        };
        let json = serde_json::to_value(&outbound).unwrap();
        assert_eq!(json["destinationUrl"], "https://consumer.example/cb");
        assert_eq!(json["forwardedHeaders"][0]["key"], "X-Hub-Signature");
        assert_eq!(json["payload"], "{}");
    }

    #[test]
    fn validate_response_parses_optional_error_message() {
        let parsed: ValidateCallbackResponse =
            serde_json::from_str(r#"{"successful":false,"errorMessage":"DNS"}"#).unwrap();
        assert!(!parsed.successful);
        assert_eq!(parsed.error_message.as_deref(), Some("DNS"));

        let parsed: ValidateCallbackResponse =
            serde_json::from_str(r#"{"successful":true}"#).unwrap();
        assert!(parsed.successful);
        assert!(parsed.error_message.is_none());
    }
}
