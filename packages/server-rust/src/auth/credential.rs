//! Time-bounded access tokens.

use std::fmt;
use std::time::{Duration, Instant};

/// An opaque access token and the instant it stops being valid.
///
/// Never persisted and never logged: `Debug` redacts the token.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now() + expires_in,
        }
    }

    /// The bearer token for downstream requests.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Time left before expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// True when the credential expires within `margin`.
    #[must_use]
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.remaining() <= margin
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_in", &self.remaining())
            .finish()
    }
}

/// Failure to obtain a service credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint rejected the service account with status {status}")]
    Rejected { status: u16 },
    #[error("token endpoint returned an unusable response: {0}")]
    MalformedResponse(String),
}
