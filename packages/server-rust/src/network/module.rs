//! Network module with deferred startup lifecycle.
//!
//! `new()` records the configuration, `start()` loads TLS material and binds
//! the TCP listener, and `serve()` starts accepting connections. Binding is
//! the last bootstrap step, so a port is only ever opened once every
//! dependency check passed, and nothing that can still fail is left for
//! `serve()` beyond the accept loop itself.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::config::NetworkConfig;
use super::middleware::{
    build_http_layers, cors_layers, ensure_error_envelope, short_circuit_preflight,
};
use crate::service::operation::OperationError;

/// Why [`NetworkModule::start`] could not prepare the listener.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("cannot load TLS material from {}: {source}", .cert_path.display())]
    Tls { cert_path: PathBuf, source: io::Error },
    #[error("cannot bind {address}: {source}")]
    Bind { address: String, source: io::Error },
}

/// Owns the listening socket from bind until shutdown.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    tls: Option<RustlsConfig>,
}

impl NetworkModule {
    /// Creates a network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            tls: None,
        }
    }

    /// Loads the configured TLS material, then binds the TCP listener to the
    /// configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns [`StartError::Tls`] if the certificate or key cannot be
    /// loaded (no port is bound then), or [`StartError::Bind`] if the
    /// address cannot be bound.
    pub async fn start(&mut self) -> Result<u16, StartError> {
        if let Some(ref tls_config) = self.config.tls {
            let loaded = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
                .await
                .map_err(|source| StartError::Tls {
                    cert_path: tls_config.cert_path.clone(),
                    source,
                })?;
            debug!(cert = %tls_config.cert_path.display(), "TLS material loaded");
            self.tls = Some(loaded);
        }

        let address = self.config.bind_address();
        let bind_error = |source| StartError::Bind {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
        let port = listener.local_addr().map_err(bind_error)?.port();

        info!(
            "TCP listener bound to {}://{}:{}",
            self.config.scheme(),
            self.config.host,
            port
        );

        self.listener = Some(listener);
        Ok(port)
    }

    /// The bound port, once `start()` succeeded.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|addr| addr.port())
    }

    /// Serves `routes` until `shutdown` resolves, then drains in-flight
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        routes: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = assemble_router(routes, &self.config);

        if let Some(tls) = self.tls {
            serve_tls(listener, router, tls, shutdown).await
        } else {
            serve_plain(listener, router, shutdown).await
        }
    }
}

/// Wraps operation routes with the 404 fallback, transport layers, the
/// error envelope and CORS.
///
/// CORS is outermost so that `OPTIONS` short-circuits before routing and
/// every response, including errors, carries the headers.
pub fn assemble_router(routes: Router, config: &NetworkConfig) -> Router {
    routes
        .fallback(not_found)
        .layer(build_http_layers(config))
        .layer(axum::middleware::map_response(ensure_error_envelope))
        .layer(axum::middleware::from_fn(short_circuit_preflight))
        .layer(cors_layers())
}

async fn not_found() -> Response {
    OperationError::with_status(StatusCode::NOT_FOUND, "Not found.").into_response()
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls, reusing the
/// pre-bound listener and the material loaded by `start()`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    rustls_config: RustlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    info!("HTTPS server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and that signal is
/// ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}
