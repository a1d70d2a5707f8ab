use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod crypto;
mod db;
mod error;
mod middleware;
mod routes;
mod services;

use config::Config;
use crypto::MessageCipher;
use services::events::{EventPublisher, EventsClient};
use services::gateway::{NotificationGateway, PushGateway};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub cipher: MessageCipher,
    pub gateway: Arc<dyn NotificationGateway>,
    pub events: Arc<dyn EventPublisher>,
}

/// Assemble the HTTP surface. Everything under `/box` sits behind the
/// user-agent allow-list; the health probe stays open.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(
            routes::boxes::router()
                .merge(routes::notifications::router())
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::user_agent::validate_user_agent,
                )),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notification hub");

    let cipher = MessageCipher::from_base64_key(&config.notifications.encryption_key_base64)?;

    // Initialize database (migrations + TTL reconciliation)
    let pool = services::init::init_db(&config).await?;

    let gateway: Arc<dyn NotificationGateway> = Arc::new(PushGateway::new(&config.gateway)?);
    let events: Arc<dyn EventPublisher> =
        Arc::new(EventsClient::new(&config.events, config.gateway.timeout_seconds)?);

    let state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        cipher,
        gateway,
        events,
    });

    // Spawn background workers (retry sweeper, TTL purge)
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let worker_handles = services::init::spawn_background_workers(state.clone(), shutdown_tx.clone());

    let app = build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Let the workers finish their in-flight items.
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
