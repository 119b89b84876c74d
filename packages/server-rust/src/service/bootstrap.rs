//! Startup sequence: every dependency is verified, in order, before a port
//! is opened.
//!
//! ```text
//! Idle -> CredentialsAcquired -> StorageVerified -> SchemaResolved -> Registered -> Listening
//!   \______________________________ any failure ______________________________/-> Failed
//! ```
//!
//! Each transition runs once and is bounded by the configured step timeout.
//! A failure is logged, alerted and leaves the machine in `Failed`; the
//! process is not terminated (fail open to restart).

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::Router;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use ak_core::{DocumentLoader, SchemaError, SchemaResolver};

use super::config::ServiceConfig;
use super::registry::{HandlerTable, OperationRegistry, RegistrationError};
use crate::auth::CredentialError;
use crate::network::{AppState, NetworkModule, StartError};
use crate::traits::{AlertSink, CredentialProvider, StorageProbe};

const FAILURE_CONTEXT: &str = "app";
const FAILURE_MESSAGE: &str =
    "Error occurred while initializing API service. System may need to be restarted.";

/// Lifecycle phase of the bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapPhase {
    Idle,
    CredentialsAcquired,
    StorageVerified,
    SchemaResolved,
    Registered,
    /// Terminal success.
    Listening,
    /// Terminal failure for this process instance.
    Failed,
}

impl BootstrapPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CredentialsAcquired => "credentials_acquired",
            Self::StorageVerified => "storage_verified",
            Self::SchemaResolved => "schema_resolved",
            Self::Registered => "registered",
            Self::Listening => "listening",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Listening | Self::Failed)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus the ordered list of phases entered.
///
/// The current phase is read lock-free; history is only touched on
/// transitions.
pub struct BootstrapMonitor {
    phase: ArcSwap<BootstrapPhase>,
    history: Mutex<Vec<BootstrapPhase>>,
}

impl BootstrapMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ArcSwap::from_pointee(BootstrapPhase::Idle),
            history: Mutex::new(vec![BootstrapPhase::Idle]),
        }
    }

    #[must_use]
    pub fn phase(&self) -> BootstrapPhase {
        **self.phase.load()
    }

    #[must_use]
    pub fn history(&self) -> Vec<BootstrapPhase> {
        self.history.lock().clone()
    }

    /// True if `phase` was entered at any point.
    #[must_use]
    pub fn reached(&self, phase: BootstrapPhase) -> bool {
        self.history.lock().contains(&phase)
    }

    fn enter(&self, next: BootstrapPhase) {
        let mut history = self.history.lock();
        let previous = self.phase();
        if previous.is_terminal() {
            return;
        }
        history.push(next);
        self.phase.store(Arc::new(next));
        debug!(from = %previous, to = %next, "Bootstrap phase changed");
    }
}

impl Default for BootstrapMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// A fatal bootstrap failure.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("credential acquisition failed: {0}")]
    AuthFailure(#[from] CredentialError),
    #[error("storage is unreachable: {detail}")]
    StorageUnreachable { detail: String },
    #[error("API description could not be resolved: {0}")]
    Schema(#[from] SchemaError),
    #[error("operation registration failed: {0}")]
    Registration(#[from] RegistrationError),
    #[error("TLS material at {} is unusable: {source}", .cert_path.display())]
    Tls {
        cert_path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("cannot bind port {port}: {source}")]
    PortBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("{step} did not finish within {timeout:?}")]
    Timeout { step: &'static str, timeout: Duration },
    #[error("{step} was interrupted: {source}")]
    Interrupted {
        step: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// External collaborators the bootstrap sequence verifies.
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialProvider>,
    pub storage: Arc<dyn StorageProbe>,
    pub documents: Arc<dyn DocumentLoader>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Drives the startup sequence once.
pub struct Bootstrapper {
    config: Arc<ServiceConfig>,
    deps: Collaborators,
    monitor: Arc<BootstrapMonitor>,
}

impl Bootstrapper {
    #[must_use]
    pub fn new(config: Arc<ServiceConfig>, deps: Collaborators) -> Self {
        Self {
            config,
            deps,
            monitor: Arc::new(BootstrapMonitor::new()),
        }
    }

    /// Shared view of the phase, usable while `run` is in progress.
    #[must_use]
    pub fn monitor(&self) -> Arc<BootstrapMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Runs every step in order and returns a bound, not yet serving,
    /// listener.
    ///
    /// # Errors
    ///
    /// Returns the first [`BootstrapError`]. The monitor is then in
    /// [`BootstrapPhase::Failed`] and one alert has been sent.
    pub async fn run(self, handlers: HandlerTable) -> Result<ListeningServer, BootstrapError> {
        let started = Instant::now();
        match self.advance(&handlers).await {
            Ok(server) => {
                info!(
                    port = server.port(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "{} bootstrap complete",
                    self.config.name
                );
                Ok(server)
            }
            Err(err) => {
                let failed_in = self.monitor.phase();
                self.monitor.enter(BootstrapPhase::Failed);
                error!(error = ?err, after = %failed_in, "{FAILURE_MESSAGE}");
                self.deps.alerts.notify(
                    self.config
                        .alert(FAILURE_CONTEXT, &format!("{FAILURE_MESSAGE}\n{err}")),
                );
                Err(err)
            }
        }
    }

    async fn advance(&self, handlers: &HandlerTable) -> Result<ListeningServer, BootstrapError> {
        let limit = self.config.bootstrap_step_timeout;

        let credential = bounded("credential acquisition", limit, self.deps.credentials.acquire()).await??;
        debug!(expires_in = ?credential.remaining(), "Service credential valid");
        self.monitor.enter(BootstrapPhase::CredentialsAcquired);

        let health = bounded("storage probe", limit, self.deps.storage.check()).await?;
        if !health.ok {
            return Err(BootstrapError::StorageUnreachable {
                detail: health.detail,
            });
        }
        info!("Connected to storage");
        self.monitor.enter(BootstrapPhase::StorageVerified);

        let loader = Arc::clone(&self.deps.documents);
        let location = self.config.api_document.to_string_lossy().into_owned();
        let resolution = tokio::task::spawn_blocking(move || {
            let raw = loader.load(&location)?;
            SchemaResolver::new(loader).resolve(raw)
        });
        let api = bounded("schema resolution", limit, resolution)
            .await?
            .map_err(|source| BootstrapError::Interrupted {
                step: "schema resolution",
                source,
            })??;
        info!(
            version = api.version().unwrap_or("unknown"),
            operations = api.operations().len(),
            "Loaded API description"
        );
        self.monitor.enter(BootstrapPhase::SchemaResolved);

        let bound = OperationRegistry::register(&api, handlers)?;
        self.monitor.enter(BootstrapPhase::Registered);

        let mut network = NetworkModule::new(self.config.network.clone());
        let configured_port = self.config.network.port;
        let port = bounded("port bind", limit, network.start())
            .await?
            .map_err(|err| match err {
                StartError::Tls { cert_path, source } => BootstrapError::Tls { cert_path, source },
                StartError::Bind { source, .. } => BootstrapError::PortBind {
                    port: configured_port,
                    source,
                },
            })?;

        let state = AppState {
            config: Arc::clone(&self.config),
            storage: Arc::clone(&self.deps.storage),
            alerts: Arc::clone(&self.deps.alerts),
            api: Arc::new(api),
        };
        let routes = bound.into_router(state);
        self.monitor.enter(BootstrapPhase::Listening);
        info!("{} listening on port {}", self.config.name, port);

        Ok(ListeningServer {
            network,
            routes,
            port,
        })
    }
}

async fn bounded<F: Future>(
    step: &'static str,
    timeout: Duration,
    future: F,
) -> Result<F::Output, BootstrapError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| BootstrapError::Timeout { step, timeout })
}

/// A bound listener with its routes, ready to accept connections.
pub struct ListeningServer {
    network: NetworkModule,
    routes: Router,
    port: u16,
}

impl ListeningServer {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal server I/O or TLS error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.network.serve(self.routes, shutdown).await
    }
}
