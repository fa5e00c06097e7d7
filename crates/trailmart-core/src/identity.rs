//! Identity-provider webhook payloads.
//!
//! Provider events arrive as loosely-shaped JSON. They are lifted into
//! [`IdentityEvent`]: a typed payload for the event types the identity
//! consumer acts on, and an opaque fallback carrying the raw document for
//! everything else.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Authentication context attached to a provider event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDetails {
    pub realm_id: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub session_id: Option<String>,
}

/// Provider event body.
///
/// `{time, realmId, uid, type, authDetails: {...}, details}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakEventPayload {
    /// Unix epoch milliseconds.
    pub time: Option<i64>,
    pub realm_id: Option<String>,
    /// Globally unique upstream event id; the idempotency key.
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub auth_details: Option<AuthDetails>,
    pub details: Option<JsonValue>,
}

impl KeycloakEventPayload {
    /// Provider user id from `authDetails.userId`, when non-blank.
    pub fn user_id(&self) -> Option<&str> {
        self.auth_details
            .as_ref()
            .and_then(|a| a.user_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    /// Upstream event uid, when non-blank.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref().filter(|uid| !uid.trim().is_empty())
    }

    /// Event time, or `None` when absent or out of range.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    pub fn auth(&self) -> AuthDetails {
        self.auth_details.clone().unwrap_or_default()
    }
}

/// Provider event after type dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEvent {
    Register(KeycloakEventPayload),
    Login(KeycloakEventPayload),
    /// Any other event type, kept as the raw document.
    Unknown {
        event_type: String,
        document: JsonValue,
    },
}

impl IdentityEvent {
    /// Parse a raw provider body given its advertised event type.
    ///
    /// Fails with [`Error::Serialization`](crate::Error::Serialization) when the body is not JSON or does
    /// not fit the typed payload of a known event type.
    pub fn parse(event_type: &str, raw_payload: &str) -> Result<Self> {
        match normalize_event_type(event_type).as_str() {
            "register" => Ok(Self::Register(serde_json::from_str(raw_payload)?)),
            "login" => Ok(Self::Login(serde_json::from_str(raw_payload)?)),
            other => {
                let document = serde_json::from_str(raw_payload)?;
                Ok(Self::Unknown {
                    event_type: other.to_string(),
                    document,
                })
            }
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Register(_) => "register",
            Self::Login(_) => "login",
            Self::Unknown { event_type, .. } => event_type,
        }
    }
}

/// Normalize a provider event type for dispatch.
///
/// Trims, lower-cases, and drops the `access.` namespace some providers
/// prefix on user events, so `REGISTER`, `register` and `access.REGISTER`
/// dispatch identically.
pub fn normalize_event_type(event_type: &str) -> String {
    let lowered = event_type.trim().to_lowercase();
    match lowered.strip_prefix("access.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Extract the advertised event type from a webhook body (`type`, else `"unknown"`).
pub fn advertised_event_type(document: &JsonValue) -> String {
    document
        .get("type")
        .and_then(JsonValue::as_str)
        .unwrap_or("unknown")
        .to_string()
}
