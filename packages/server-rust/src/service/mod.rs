//! Service lifecycle and operation execution.
//!
//! 1. **Configuration** (`config`): immutable `ServiceConfig` read once at start
//! 2. **Operations** (`operation`): typed identifiers, results and error envelopes
//! 3. **Registry** (`registry`): binds declared operations to handlers, all or nothing,
//!    checking each request against its declared parameters (`request`)
//! 4. **Bootstrap** (`bootstrap`): ordered dependency checks ending in a bound port
//! 5. **Alerts** (`alert`) on a bounded background worker (`worker`)

pub mod alert;
pub mod bootstrap;
pub mod config;
pub mod operation;
pub mod registry;
pub mod request;
pub mod worker;

pub use alert::{format_alert, AlertConfig, WebhookAlertSink};
pub use bootstrap::{
    BootstrapError, BootstrapMonitor, BootstrapPhase, Bootstrapper, Collaborators, ListeningServer,
};
pub use config::{ConfigError, ServiceArgs, ServiceConfig, SERVICE_NAME};
pub use operation::{
    ErrorEnvelope, OperationError, OperationId, OperationResponse, OperationResult,
    INTERNAL_ERROR_MESSAGE,
};
pub use registry::{
    BoundRouter, HandlerTable, OperationBinding, OperationRegistry, RegistrationError,
};
pub use request::{OperationRequest, RequestContract};
pub use worker::{BackgroundRunnable, BackgroundWorker, SubmitError};
