//! Environment-driven configuration for the server, the identity provider,
//! and webhook ingestion.

use trailmart_core::defaults::{
    SERVER_PORT, TOKEN_REFRESH_SKEW_SECS, WEBHOOK_EVENT_TYPES, WEBHOOK_SIGNATURE_HEADER,
};
use trailmart_core::{Error, Result};

/// Read an environment variable, treating blank values as unset.
fn env_non_blank(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// Remote catalog lookup base URL. `None` means the lookup is in-process.
    pub catalog_lookup_url: Option<String>,
}

impl ServerConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Listen address |
    /// | `PORT` | `3000` | Listen port |
    /// | `DATABASE_URL` | `postgres://localhost/trailmart` | Catalog and identity store |
    /// | `REDIS_URL` | `redis://localhost:6379` | Basket cache |
    /// | `CATALOG_LOOKUP_URL` | unset | Remote catalog for basket price lookups |
    pub fn from_env() -> Self {
        Self {
            host: env_non_blank("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_non_blank("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(SERVER_PORT),
            database_url: env_non_blank("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost/trailmart".to_string()),
            redis_url: env_non_blank("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            catalog_lookup_url: env_non_blank("CATALOG_LOOKUP_URL"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity provider admin API settings.
#[derive(Debug, Clone, Default)]
pub struct KeycloakConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    /// Seconds subtracted from a token's lifetime so it is refreshed early.
    pub refresh_skew_secs: i64,
}

impl KeycloakConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KEYCLOAK_BASE_URL` | empty | Provider base URL |
    /// | `KEYCLOAK_REALM` | empty | Realm holding the webhook |
    /// | `KEYCLOAK_CLIENT_ID` | empty | Admin client id |
    /// | `KEYCLOAK_CLIENT_SECRET` | empty | Admin client secret |
    /// | `KEYCLOAK_REFRESH_SKEW_SECS` | `30` | Early refresh margin |
    pub fn from_env() -> Self {
        Self {
            base_url: env_non_blank("KEYCLOAK_BASE_URL").unwrap_or_default(),
            realm: env_non_blank("KEYCLOAK_REALM").unwrap_or_default(),
            client_id: env_non_blank("KEYCLOAK_CLIENT_ID").unwrap_or_default(),
            client_secret: env_non_blank("KEYCLOAK_CLIENT_SECRET").unwrap_or_default(),
            refresh_skew_secs: env_non_blank("KEYCLOAK_REFRESH_SKEW_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(TOKEN_REFRESH_SKEW_SECS),
        }
    }

    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_skew_secs: TOKEN_REFRESH_SKEW_SECS,
        }
    }

    pub fn with_refresh_skew(mut self, secs: i64) -> Self {
        self.refresh_skew_secs = secs;
        self
    }

    /// All four credentials must be present before a token request.
    pub fn validate(&self) -> Result<()> {
        require("KEYCLOAK_BASE_URL", &self.base_url)?;
        require("KEYCLOAK_REALM", &self.realm)?;
        require("KEYCLOAK_CLIENT_ID", &self.client_id)?;
        require("KEYCLOAK_CLIENT_SECRET", &self.client_secret)?;
        Ok(())
    }

    fn realm_url(&self, path: &str) -> String {
        format!(
            "{}/realms/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.realm,
            path
        )
    }

    pub fn token_url(&self) -> String {
        self.realm_url("protocol/openid-connect/token")
    }

    pub fn webhooks_url(&self) -> String {
        self.realm_url("webhooks")
    }
}

/// Webhook ingestion and registration settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared HMAC secret. `None` accepts unsigned requests.
    pub secret: Option<String>,
    pub signature_header: String,
    pub callback_url: Option<String>,
    pub event_types: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: WEBHOOK_SIGNATURE_HEADER.to_string(),
            callback_url: None,
            event_types: vec![WEBHOOK_EVENT_TYPES.to_string()],
        }
    }
}

impl WebhookConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WEBHOOK_SECRET` | unset | HMAC-SHA256 shared secret |
    /// | `WEBHOOK_SIGNATURE_HEADER` | `X-Keycloak-Signature` | Signature header name |
    /// | `WEBHOOK_CALLBACK_URL` | unset | URL registered with the provider |
    /// | `WEBHOOK_EVENT_TYPES` | `*` | Comma-separated event types to subscribe |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            secret: env_non_blank("WEBHOOK_SECRET"),
            signature_header: env_non_blank("WEBHOOK_SIGNATURE_HEADER")
                .unwrap_or(defaults.signature_header),
            callback_url: env_non_blank("WEBHOOK_CALLBACK_URL"),
            event_types: env_non_blank("WEBHOOK_EVENT_TYPES")
                .map(|v| parse_event_types(&v))
                .unwrap_or(defaults.event_types),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// Split a comma-separated list, falling back to `*` when nothing remains.
pub fn parse_event_types(raw: &str) -> Vec<String> {
    let types: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if types.is_empty() {
        vec![WEBHOOK_EVENT_TYPES.to_string()]
    } else {
        types
    }
}
