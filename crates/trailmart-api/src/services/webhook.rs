//! Identity-provider webhook ingestion.
//!
//! The ingestor authenticates the raw body with HMAC-SHA256, snapshots the
//! request headers, parses the document and hands the resulting
//! [`WebhookEnvelope`] to every registered [`WebhookProcessor`] in order.
//!
//! ```text
//! POST /webhook/keycloak
//!   -> verify signature (when a secret is configured)
//!   -> parse JSON, extract type / userId / realmId
//!   -> LoggingProcessor, BusRepublishProcessor, ...
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use thiserror::Error as ThisError;
use tracing::{debug, info, instrument, warn};

use trailmart_core::identity::advertised_event_type;
use trailmart_core::{
    Error, EventPublisher, IntegrationEvent, IntegrationEventKind, Result,
};

use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

/// A verified webhook, ready for processors.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEnvelope {
    /// Advertised provider event type, as received.
    pub event_type: String,
    pub user_id: Option<String>,
    pub realm_id: Option<String>,
    pub payload: JsonValue,
    /// Exact request body as UTF-8.
    pub raw_payload: String,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
}

impl WebhookEnvelope {
    /// Build an envelope from a parsed body.
    ///
    /// `userId` is read from `authDetails.userId`, falling back to a
    /// top-level `userId`.
    pub fn from_document(
        payload: JsonValue,
        raw_payload: String,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let user_id = payload
            .pointer("/authDetails/userId")
            .and_then(JsonValue::as_str)
            .or_else(|| payload.get("userId").and_then(JsonValue::as_str))
            .map(str::to_string);
        let realm_id = payload
            .get("realmId")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        Self {
            event_type: advertised_event_type(&payload),
            user_id,
            realm_id,
            payload,
            raw_payload,
            headers,
        }
    }

    pub fn into_integration_event(self) -> IntegrationEvent {
        IntegrationEvent::new(IntegrationEventKind::KeycloakWebhook {
            keycloak_event_type: self.event_type,
            user_id: self.user_id,
            realm_id: self.realm_id,
            raw_payload: self.raw_payload,
            headers: self.headers,
            payload: self.payload,
        })
    }
}

/// A step run on every verified webhook.
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, envelope: &WebhookEnvelope) -> Result<()>;
}

/// Logs the envelope summary.
pub struct LoggingProcessor;

#[async_trait]
impl WebhookProcessor for LoggingProcessor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn process(&self, envelope: &WebhookEnvelope) -> Result<()> {
        info!(
            subsystem = "webhook",
            event_type = %envelope.event_type,
            user_id = ?envelope.user_id,
            realm_id = ?envelope.realm_id,
            "Webhook received"
        );
        Ok(())
    }
}

/// Republishes the envelope on the bus as a `KeycloakWebhook` event.
pub struct BusRepublishProcessor {
    publisher: Arc<dyn EventPublisher>,
}

impl BusRepublishProcessor {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl WebhookProcessor for BusRepublishProcessor {
    fn name(&self) -> &str {
        "bus_republish"
    }

    async fn process(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let event = envelope.clone().into_integration_event();
        let event_id = event.event_id;
        self.publisher.publish(event).await?;
        debug!(subsystem = "webhook", %event_id, "Webhook republished on bus");
        Ok(())
    }
}

/// Rejection reasons for an incoming webhook.
#[derive(Debug, ThisError)]
pub enum WebhookError {
    #[error("Request body is empty")]
    EmptyBody,

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook body: {0}")]
    MalformedBody(String),

    #[error("Webhook processor failed: {0}")]
    Processor(Error),
}

/// Compute the lowercase hex HMAC-SHA256 of `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `body`.
///
/// Accepts bare hex or a `sha256=` prefix in any case. Comparison is
/// constant-time.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let value = header.trim();
    let hex_part = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256=") => &value[7..],
        _ => value,
    };

    let Ok(expected) = hex::decode(hex_part.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Authenticates, parses and fans out identity-provider webhooks.
pub struct WebhookIngestor {
    secret: Option<String>,
    signature_header: String,
    processors: Vec<Arc<dyn WebhookProcessor>>,
    missing_signature_logged: AtomicBool,
}

impl WebhookIngestor {
    pub fn processor_names(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.name().to_string()).collect()
    }

    /// Process one request.
    ///
    /// Processors run sequentially; the first failure aborts the rest.
    #[instrument(skip_all, fields(subsystem = "webhook", op = "handle", body_len = body.len()))]
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> std::result::Result<WebhookEnvelope, WebhookError> {
        if body.is_empty() {
            return Err(WebhookError::EmptyBody);
        }

        let snapshot = snapshot_headers(headers);

        match &self.secret {
            Some(secret) => {
                let Some(signature) = snapshot.get(&self.signature_header) else {
                    if !self.missing_signature_logged.swap(true, Ordering::Relaxed) {
                        warn!(
                            expected_header = %self.signature_header,
                            headers = ?snapshot.keys().collect::<Vec<_>>(),
                            "Webhook rejected: signature header missing"
                        );
                    } else {
                        warn!("Webhook rejected: signature header missing");
                    }
                    return Err(WebhookError::MissingSignature);
                };
                if !verify_signature(secret, body, signature) {
                    warn!("Webhook rejected: signature mismatch");
                    return Err(WebhookError::InvalidSignature);
                }
            }
            None => {
                warn!("Webhook secret not configured, accepting unsigned request");
            }
        }

        let raw_payload = String::from_utf8(body.to_vec())
            .map_err(|e| WebhookError::MalformedBody(e.to_string()))?;
        let payload: JsonValue = serde_json::from_str(&raw_payload)
            .map_err(|e| WebhookError::MalformedBody(e.to_string()))?;

        let envelope = WebhookEnvelope::from_document(payload, raw_payload, snapshot);

        for processor in &self.processors {
            if let Err(e) = processor.process(&envelope).await {
                warn!(processor = processor.name(), error = %e, "Webhook processor failed");
                return Err(WebhookError::Processor(e));
            }
        }

        Ok(envelope)
    }
}

fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// Builder for [`WebhookIngestor`].
pub struct WebhookIngestorBuilder {
    config: WebhookConfig,
    processors: Vec<Arc<dyn WebhookProcessor>>,
}

impl WebhookIngestorBuilder {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            processors: Vec::new(),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn WebhookProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn build(self) -> WebhookIngestor {
        WebhookIngestor {
            secret: self.config.secret.filter(|s| !s.is_empty()),
            signature_header: self.config.signature_header.to_lowercase(),
            processors: self.processors,
            missing_signature_logged: AtomicBool::new(false),
        }
    }
}
