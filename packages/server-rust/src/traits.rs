use async_trait::async_trait;

use ak_core::HealthResult;

use crate::auth::{Credential, CredentialError};

/// Acquires the service-level access token that downstream calls need.
///
/// Implementations: OAuth password grant ([`OAuthCredentialProvider`](crate::auth::OAuthCredentialProvider)),
/// static tokens (tests).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a credential that is valid for at least the refresh margin,
    /// fetching a new one if needed.
    async fn acquire(&self) -> Result<Credential, CredentialError>;
}

/// Lightweight, side-effect-free round-trip against the backing store.
///
/// Called once during bootstrap and again on every liveness request, so it
/// must be cheap and safe to run concurrently.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    /// Probe the store. Never errors: failures are reported as `ok == false`.
    async fn check(&self) -> HealthResult;
}

/// Fire-and-forget delivery of operator-facing failure notifications.
///
/// `notify` must return immediately and never fail the caller; delivery
/// problems are logged by the sink itself.
pub trait AlertSink: Send + Sync {
    fn notify(&self, message: String);
}
