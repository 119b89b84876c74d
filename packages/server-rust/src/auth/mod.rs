//! Service-account credentials.

pub mod credential;
pub mod provider;

pub use credential::{Credential, CredentialError};
pub use provider::{CredentialConfig, OAuthCredentialProvider};
