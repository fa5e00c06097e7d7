//! Client-credentials token cache for the identity provider admin API.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use trailmart_core::defaults::HTTP_TIMEOUT_SECS;
use trailmart_core::{Error, Result};

use crate::config::KeycloakConfig;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && Utc::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Caches one admin access token and refreshes it shortly before expiry.
///
/// Concurrent callers that find the cache stale share a single refresh.
pub struct AdminTokenCache {
    client: reqwest::Client,
    config: KeycloakConfig,
    cached: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl AdminTokenCache {
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build token client: {e}")))?;
        Ok(Self {
            client,
            config,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Return a valid access token, requesting a new one when needed.
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.current() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.current() {
            return Ok(token);
        }

        let fresh = self.request_token().await?;
        let token = fresh.access_token.clone();
        if let Ok(mut slot) = self.cached.write() {
            *slot = Some(fresh);
        }
        Ok(token)
    }

    fn current(&self) -> Option<String> {
        self.cached
            .read()
            .ok()?
            .as_ref()
            .filter(|t| t.is_valid())
            .map(|t| t.access_token.clone())
    }

    #[instrument(skip(self), fields(subsystem = "identity", component = "token_cache", op = "request_token"))]
    async fn request_token(&self) -> Result<CachedToken> {
        self.config.validate()?;

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(self.config.token_url())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        if body.access_token.trim().is_empty() {
            return Err(Error::Upstream(
                "Token endpoint returned an empty access_token".to_string(),
            ));
        }

        let expires_in = body.expires_in.max(0);
        let skew = self.config.refresh_skew_secs.clamp(0, expires_in);
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in - skew);
        debug!(expires_in, skew, "Admin token refreshed");

        Ok(CachedToken {
            access_token: body.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_validity() {
        let live = CachedToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(live.is_valid());

        let expired = CachedToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(!expired.is_valid());

        let empty = CachedToken {
            access_token: String::new(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(!empty.is_valid());
    }

    #[tokio::test]
    async fn test_access_token_requires_config() {
        let cache = AdminTokenCache::new(KeycloakConfig::default()).unwrap();
        let err = cache.access_token().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
