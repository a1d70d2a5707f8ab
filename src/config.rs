use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub events: EventsConfig,
    pub notifications: NotificationsConfig,
    pub retry: RetryConfig,
    pub user_agents: UserAgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Connection details for the external push gateway that performs the actual
/// outbound HTTPS calls to customer callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; the hub calls `{url}/notify` and `{url}/validate-callback`.
    pub outbound_url: String,
    /// Value of the `Authorization` header on every gateway call.
    pub auth_token: String,
    /// Timeout for a single gateway call. A timeout counts as a push
    /// failure, not an error.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Base URL of the application-events sink that receives audit records
    /// when a callback URL changes.
    pub api_platform_events_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Default page size for notification listing.
    pub max_per_request: i64,
    /// Notifications are physically deleted this many seconds after creation.
    pub ttl_seconds: u64,
    /// How often the TTL purge worker runs.
    pub ttl_purge_interval_seconds: u64,
    /// Base64-encoded 32-byte key for AES-256-GCM message-at-rest encryption.
    pub encryption_key_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Whether the retry sweeper is enabled.
    pub enabled: bool,
    /// Back-off schedule in seconds, indexed by how many pushes of a
    /// notification have already failed. Must be non-decreasing.
    pub interval_schedule: Vec<u64>,
    /// Cap for the back-off delay (seconds).
    pub max_backoff_seconds: u64,
    /// Maximum elapsed time since creation during which a pending
    /// notification is still re-pushed; past it the notification fails.
    pub retry_window_seconds: u64,
    /// Sleep between sweep cycles (seconds).
    pub sweep_interval_seconds: u64,
    /// How many retry-eligible notifications one batch pull may return.
    pub sweep_batch_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Inbound `User-Agent` values permitted on the `/box` surface.
    pub allowed: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let schedule = parse_schedule(
            &env::var("RETRY_INTERVAL_SCHEDULE").unwrap_or_else(|_| "1,5,30,300,3600".to_string()),
        )?;

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/hub.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            gateway: GatewayConfig {
                outbound_url: env::var("OUTBOUND_NOTIFICATIONS_URL").map_err(|_| {
                    ConfigError::MissingEnv("OUTBOUND_NOTIFICATIONS_URL".to_string())
                })?,
                auth_token: env::var("GATEWAY_AUTH_TOKEN")
                    .map_err(|_| ConfigError::MissingEnv("GATEWAY_AUTH_TOKEN".to_string()))?,
                timeout_seconds: env::var("GATEWAY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
            events: EventsConfig {
                api_platform_events_url: env::var("API_PLATFORM_EVENTS_URL")
                    .map_err(|_| ConfigError::MissingEnv("API_PLATFORM_EVENTS_URL".to_string()))?,
            },
            notifications: NotificationsConfig {
                max_per_request: env::var("NOTIFICATIONS_PER_REQUEST")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
                ttl_seconds: env::var("NOTIFICATION_TTL_SECONDS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()
                    .unwrap_or(604_800),
                ttl_purge_interval_seconds: env::var("TTL_PURGE_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                encryption_key_base64: env::var("MESSAGE_ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::MissingEnv("MESSAGE_ENCRYPTION_KEY".to_string()))?,
            },
            retry: RetryConfig {
                enabled: match env::var("RETRY_SWEEPER_ENABLED") {
                    Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
                    Err(_) => true,
                },
                interval_schedule: schedule,
                max_backoff_seconds: env::var("RETRY_MAX_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                retry_window_seconds: env::var("RETRY_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "21600".to_string())
                    .parse()
                    .unwrap_or(21_600),
                sweep_interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                sweep_batch_size: env::var("SWEEP_BATCH_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
            user_agents: UserAgentConfig {
                allowed: parse_list(
                    &env::var("ALLOWED_USER_AGENTS")
                        .map_err(|_| ConfigError::MissingEnv("ALLOWED_USER_AGENTS".to_string()))?,
                ),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/hub.db".to_string(),
                max_connections: 5,
            },
            gateway: GatewayConfig {
                outbound_url: "http://localhost:6001".to_string(),
                auth_token: String::new(),
                timeout_seconds: 20,
            },
            events: EventsConfig {
                api_platform_events_url: "http://localhost:6700".to_string(),
            },
            notifications: NotificationsConfig {
                max_per_request: 100,
                ttl_seconds: 604_800,
                ttl_purge_interval_seconds: 300,
                encryption_key_base64: String::new(),
            },
            retry: RetryConfig {
                enabled: true,
                interval_schedule: vec![1, 5, 30, 300, 3600],
                max_backoff_seconds: 3600,
                retry_window_seconds: 21_600,
                sweep_interval_seconds: 30,
                sweep_batch_size: 100,
            },
            user_agents: UserAgentConfig { allowed: Vec::new() },
        }
    }
}

/// Parse a comma-separated back-off schedule. The schedule drives monotonic
/// back-off, so a decreasing entry is a configuration error.
fn parse_schedule(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let schedule: Vec<u64> = raw
        .split(',')
        .map(|s| s.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::InvalidValue("RETRY_INTERVAL_SCHEDULE".to_string()))?;

    if schedule.is_empty() {
        return Err(ConfigError::InvalidValue(
            "RETRY_INTERVAL_SCHEDULE".to_string(),
        ));
    }
    if schedule.windows(2).any(|w| w[0] > w[1]) {
        return Err(ConfigError::InvalidValue(
            "RETRY_INTERVAL_SCHEDULE must be non-decreasing".to_string(),
        ));
    }
    Ok(schedule)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
