//! `AK` Server: API service front-end that verifies credentials, storage and
//! its API description before it accepts a single request, then reports its
//! own health and escalates failures to operators.

pub mod auth;
pub mod logging;
pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use traits::{AlertSink, CredentialProvider, StorageProbe};
