use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::AppState;

/// Gate on the inbound `User-Agent` header. The box surface is
/// server-to-server; only agents on the configured allow-list get through.
pub async fn validate_user_agent(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_agent = request
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if state
        .config
        .user_agents
        .allowed
        .iter()
        .any(|allowed| allowed == user_agent)
    {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            "Rejected request from disallowed user agent '{}'",
            user_agent
        );
        Err(AppError::Forbidden)
    }
}
