//! Identity projection fed by provider webhooks.
//!
//! Registrations are idempotent on the upstream event `uid`: the ledger
//! row and the user upsert commit together. Logins only touch users that
//! already exist. Malformed payloads are logged and acknowledged.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use trailmart_core::defaults::UNKNOWN_USERNAME;
use trailmart_core::{
    IdentityEvent, IdentityRepository, KeycloakEventPayload, LoginOutcome, LoginRecord,
    Registration, RegistrationOutcome, Result,
};

/// What happened to one provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    Registered(RegistrationOutcome),
    LoggedIn(LoginOutcome),
    /// Event type the projection does not act on.
    Ignored(String),
    /// Payload could not be applied; nothing was written.
    Malformed(String),
}

pub struct IdentityService {
    repository: Arc<dyn IdentityRepository>,
}

impl IdentityService {
    pub fn new(repository: Arc<dyn IdentityRepository>) -> Self {
        Self { repository }
    }

    /// Dispatch a republished webhook by its normalized event type.
    ///
    /// `realm_id` is the envelope realm, preferred over the payload's own.
    #[instrument(skip(self, raw_payload), fields(subsystem = "identity", op = "handle_webhook"))]
    pub async fn handle_webhook(
        &self,
        event_type: &str,
        realm_id: Option<&str>,
        raw_payload: &str,
    ) -> Result<IdentityOutcome> {
        let event = match IdentityEvent::parse(event_type, raw_payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, payload_len = raw_payload.len(), "Unparseable identity event payload");
                return Ok(IdentityOutcome::Malformed(e.to_string()));
            }
        };

        match event {
            IdentityEvent::Register(payload) => self.register(event_type, realm_id, &payload).await,
            IdentityEvent::Login(payload) => self.login(&payload).await,
            IdentityEvent::Unknown { event_type, .. } => {
                debug!(%event_type, "Ignoring identity event type");
                Ok(IdentityOutcome::Ignored(event_type))
            }
        }
    }

    async fn register(
        &self,
        event_type: &str,
        realm_id: Option<&str>,
        payload: &KeycloakEventPayload,
    ) -> Result<IdentityOutcome> {
        let Some(user_id) = payload.user_id() else {
            warn!("Register event has no userId, skipping");
            return Ok(IdentityOutcome::Malformed("missing userId".to_string()));
        };
        let Some(uid) = payload.uid() else {
            warn!(%user_id, "Register event has no uid, skipping");
            return Ok(IdentityOutcome::Malformed("missing uid".to_string()));
        };

        let auth = payload.auth();
        let registration = Registration {
            uid: uid.to_string(),
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            username: auth
                .username
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
            realm_id: realm_id
                .map(str::to_string)
                .or_else(|| payload.realm_id.clone())
                .or(auth.realm_id),
            client_id: auth.client_id,
            ip_address: auth.ip_address,
            occurred_at: payload.occurred_at().unwrap_or_else(Utc::now),
        };

        let outcome = self.repository.apply_registration(&registration).await?;
        match outcome {
            RegistrationOutcome::Created => {
                info!(%user_id, username = %registration.username, event_uid = %uid, "User created")
            }
            RegistrationOutcome::Updated => {
                info!(%user_id, username = %registration.username, event_uid = %uid, "User updated")
            }
            RegistrationOutcome::Duplicate => {
                debug!(event_uid = %uid, "Duplicate register event, skipping")
            }
        }
        Ok(IdentityOutcome::Registered(outcome))
    }

    async fn login(&self, payload: &KeycloakEventPayload) -> Result<IdentityOutcome> {
        let Some(user_id) = payload.user_id() else {
            warn!("Login event has no userId, skipping");
            return Ok(IdentityOutcome::Malformed("missing userId".to_string()));
        };

        let auth = payload.auth();
        let login = LoginRecord {
            user_id: user_id.to_string(),
            ip_address: auth.ip_address,
            session_id: auth.session_id,
            occurred_at: payload.occurred_at().unwrap_or_else(Utc::now),
        };

        let outcome = self.repository.record_login(&login).await?;
        match outcome {
            LoginOutcome::Updated => info!(%user_id, ip = ?login.ip_address, "User login recorded"),
            LoginOutcome::UnknownUser => info!(%user_id, "Login for a user that has not registered"),
        }
        Ok(IdentityOutcome::LoggedIn(outcome))
    }
}
