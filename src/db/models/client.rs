use chrono::NaiveDateTime;
use sqlx::FromRow;

/// Raw client row. Secrets are stored as a JSON array in `secrets_json`.
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub client_id: String,
    pub secrets_json: String,
    pub created_at: NaiveDateTime,
}

/// An API client and its signing secrets.
///
/// The first secret is the active one used to sign outbound pushes; any
/// following entries are older secrets kept around for rotation windows.
/// Clients are created lazily on first reference and never deleted.
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub secrets: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl Client {
    pub fn active_secret(&self) -> &str {
        // The repository refuses to persist an empty secret list.
        &self.secrets[0]
    }
}
