//! Bearer-token acquisition via the platform's client-credential grant.
//!
//! Tokens are short-lived, so every API call asks the [`TokenCache`] for the
//! current token of its environment. The cache refreshes lazily on expiry and
//! serializes refreshes per environment name so concurrent workers sharing an
//! environment trigger a single exchange.

pub mod error;
pub mod responses;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;

use crate::api::endpoints::Endpoints;
use crate::config::Environment;

pub use self::error::AuthError;
use self::responses::{TokenRequest, TokenResponse};

/// An access token and the instant it stops being usable.
#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<Token>>>;

/// Seconds shaved off the advertised lifetime so a token is not used while
/// it expires in flight.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Process-wide token cache keyed by environment name.
pub struct TokenCache {
    client: Client,
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, env_name: &str) -> Slot {
        // The map guard is never held across an await.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(env_name.to_string()).or_default().clone()
    }

    /// Return a usable access token for `env`, exchanging credentials if the
    /// cached one is missing or expired.
    pub async fn get_token(&self, env: &Environment) -> Result<String, AuthError> {
        let slot = self.slot(&env.name);
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            tracing::debug!(env = %env.name, "Access token expired, refreshing");
        }

        let token = self.exchange(env).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn exchange(&self, env: &Environment) -> Result<Token, AuthError> {
        let url = Endpoints::for_environment(env).auth;
        let body = TokenRequest {
            grant_type: "client_credentials",
            client_id: &env.client_id,
            client_secret: &env.client_secret,
            account_id: &env.account_id,
        };

        let response = self
            .client
            .post(&url)
            .form(&body)
            .send()
            .await
            .map_err(|source| AuthError::Request {
                env: env.name.clone(),
                source,
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| AuthError::Request {
            env: env.name.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                env: env.name.clone(),
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|source| AuthError::Json {
                env: env.name.clone(),
                source,
            })?;

        let access_token = parsed.access_token.ok_or_else(|| AuthError::MissingField {
            env: env.name.clone(),
            field: "access_token",
        })?;
        let expires_in = parsed.expires_in.ok_or_else(|| AuthError::MissingField {
            env: env.name.clone(),
            field: "expires_in",
        })?;

        tracing::debug!(env = %env.name, expires_in, "Obtained access token");

        let expires_at = Duration::try_seconds(expires_in.saturating_sub(EXPIRY_MARGIN_SECS))
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::InvalidExpiry {
                env: env.name.clone(),
                expires_in,
            })?;

        Ok(Token {
            access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_environment(name: &str, server_uri: &str) -> Environment {
    Environment {
        name: name.to_string(),
        subdomain: format!("mc-{name}"),
        client_id: format!("{name}-client"),
        client_secret: format!("{name}-secret"),
        account_id: "514000000".to_string(),
        catalog_url: format!("{server_uri}/{name}/catalog"),
        auth_url: Some(format!("{server_uri}/{name}/v2/token")),
        rest_url: Some(format!("{server_uri}/{name}")),
        soap_url: Some(format!("{server_uri}/{name}/Service.asmx")),
    }
}
