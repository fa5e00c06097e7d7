//! Startup registration of the webhook callback with the identity provider.
//!
//! Registration is idempotent: an existing webhook for the same callback URL
//! (compared case-insensitively) is left untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use trailmart_core::defaults::HTTP_TIMEOUT_SECS;
use trailmart_core::{Error, Result};

use super::admin_token::AdminTokenCache;
use crate::config::{KeycloakConfig, WebhookConfig};

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Registration was not attempted.
    Skipped(String),
    /// A webhook for the callback URL already exists (with its id, if reported).
    AlreadyRegistered(Option<String>),
    Created,
}

#[derive(Debug, Deserialize)]
struct RegisteredWebhook {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: String,
}

pub struct WebhookRegistrar {
    client: reqwest::Client,
    keycloak: KeycloakConfig,
    webhook: WebhookConfig,
    tokens: Arc<AdminTokenCache>,
}

impl WebhookRegistrar {
    pub fn new(
        keycloak: KeycloakConfig,
        webhook: WebhookConfig,
        tokens: Arc<AdminTokenCache>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build registrar client: {e}")))?;
        Ok(Self {
            client,
            keycloak,
            webhook,
            tokens,
        })
    }

    /// Ensure the provider delivers events to our callback URL.
    ///
    /// Missing base URL or callback URL skips registration with a warning.
    /// A missing realm or secret is a configuration error.
    #[instrument(skip(self), fields(subsystem = "identity", component = "registrar", op = "register"))]
    pub async fn register(&self) -> Result<RegistrationStatus> {
        if self.keycloak.base_url.trim().is_empty() {
            warn!("KEYCLOAK_BASE_URL not set, skipping webhook registration");
            return Ok(RegistrationStatus::Skipped("base URL not configured".to_string()));
        }
        if self.keycloak.realm.trim().is_empty() {
            return Err(Error::Config(
                "KEYCLOAK_REALM must be set to register the webhook".to_string(),
            ));
        }
        let Some(callback_url) = self.webhook.callback_url.as_deref() else {
            warn!("WEBHOOK_CALLBACK_URL not set, skipping webhook registration");
            return Ok(RegistrationStatus::Skipped(
                "callback URL not configured".to_string(),
            ));
        };
        let Some(secret) = self.webhook.secret.as_deref() else {
            return Err(Error::Config(
                "WEBHOOK_SECRET must be set to register the webhook".to_string(),
            ));
        };

        let token = self.tokens.access_token().await?;
        let url = self.keycloak.webhooks_url();

        let existing = self.list_webhooks(&url, &token).await?;
        if let Some(found) = existing
            .into_iter()
            .find(|w| w.url.eq_ignore_ascii_case(callback_url))
        {
            info!(webhook_id = ?found.id, %callback_url, "Webhook already registered");
            return Ok(RegistrationStatus::AlreadyRegistered(found.id));
        }

        let body = json!({
            "enabled": true,
            "url": callback_url,
            "secret": secret,
            "eventTypes": self.webhook.event_types,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Webhook registration returned {status}: {text}"
            )));
        }

        info!(%callback_url, event_types = ?self.webhook.event_types, "Webhook registered");
        Ok(RegistrationStatus::Created)
    }

    /// A failed listing is treated as "none registered".
    async fn list_webhooks(&self, url: &str, token: &str) -> Result<Vec<RegisteredWebhook>> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Listing webhooks failed, assuming none registered");
            return Ok(Vec::new());
        }
        match response.json::<Vec<RegisteredWebhook>>().await {
            Ok(hooks) => Ok(hooks),
            Err(e) => {
                warn!(error = %e, "Unreadable webhook list, assuming none registered");
                Ok(Vec::new())
            }
        }
    }
}
