//! Operation handlers and the shared state they run against.
//!
//! Handlers receive an [`AppState`] and the checked request by value. Every
//! state field is behind an `Arc`, so cloning per request is cheap and
//! nothing in it is mutable.

pub mod status;

pub use status::{get_info, get_status};

use std::sync::Arc;

use ak_core::ApiDescription;

use crate::service::config::ServiceConfig;
use crate::service::operation::OperationId;
use crate::service::registry::HandlerTable;
use crate::traits::{AlertSink, StorageProbe};

/// Read-only state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Probed on every `GET /status`.
    pub storage: Arc<dyn StorageProbe>,
    pub alerts: Arc<dyn AlertSink>,
    /// The resolved API description the routes were bound from.
    pub api: Arc<ApiDescription>,
}

/// Handlers for every operation this service implements.
#[must_use]
pub fn default_handlers() -> HandlerTable {
    HandlerTable::new()
        .with(OperationId::GetServiceStatus, get_status)
        .with(OperationId::GetServiceInfo, get_info)
}
