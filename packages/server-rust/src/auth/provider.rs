//! OAuth password-grant credential provider for the service account.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::credential::{Credential, CredentialError};
use crate::traits::CredentialProvider;

/// Where and how to obtain the service-account token.
#[derive(Clone)]
pub struct CredentialConfig {
    /// Token endpoint accepting a JSON password grant.
    pub token_url: String,
    pub username: String,
    pub secret: String,
    /// Upper bound for a single token request.
    pub request_timeout: Duration,
    /// Cached tokens closer than this to expiry are re-acquired.
    pub refresh_margin: Duration,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("token_url", &self.token_url)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenBody {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Envelope {
    access_token: TokenBody,
}

/// Accepts both a flat OAuth body and the `{"result": {"access_token": {...}}}`
/// envelope used by Tapis-style identity services.
#[derive(Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Flat(TokenBody),
    Wrapped { result: Envelope },
}

impl TokenResponse {
    fn into_body(self) -> TokenBody {
        match self {
            Self::Flat(body) => body,
            Self::Wrapped { result } => result.access_token,
        }
    }
}

/// Fetches and caches the service-account token.
///
/// Concurrent callers are serialized on the cache so an expiring token is
/// refreshed once, not once per caller.
pub struct OAuthCredentialProvider {
    client: reqwest::Client,
    config: CredentialConfig,
    cached: Mutex<Option<Credential>>,
}

impl OAuthCredentialProvider {
    /// Builds the provider and its HTTP client. No request is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Request`] if the HTTP client cannot be built.
    pub fn new(config: CredentialConfig) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<Credential, CredentialError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .json(&TokenRequest {
                username: &self.config.username,
                password: &self.config.secret,
                grant_type: "password",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?
            .into_body();
        if body.access_token.is_empty() {
            return Err(CredentialError::MalformedResponse(
                "empty access_token".to_string(),
            ));
        }
        Ok(Credential::new(
            body.access_token,
            Duration::from_secs(body.expires_in),
        ))
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.needs_refresh(self.config.refresh_margin) {
                debug!(expires_in_secs = credential.remaining().as_secs(), "reusing cached service token");
                return Ok(credential.clone());
            }
        }

        let started = Instant::now();
        let credential = self.fetch().await?;
        info!(
            account = %self.config.username,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            expires_in_secs = credential.remaining().as_secs(),
            "Acquired service account token"
        );
        *cached = Some(credential.clone());
        Ok(credential)
    }
}
