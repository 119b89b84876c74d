//! Shared fixtures for unit tests.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use ak_core::schema::MemoryLoader;
use ak_core::{ApiDescription, HealthResult, RawDocument, SchemaResolver};

use crate::auth::{Credential, CredentialError};
use crate::network::AppState;
use crate::service::config::ServiceConfig;
use crate::traits::{AlertSink, CredentialProvider, StorageProbe};

/// Serves `router` on an ephemeral local port for the rest of the test.
pub(crate) async fn serve_stub(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Storage whose health can be flipped between calls.
#[derive(Clone)]
pub(crate) struct StubStorage {
    ok: Arc<AtomicBool>,
    detail: String,
}

impl StubStorage {
    pub(crate) fn up() -> Self {
        Self {
            ok: Arc::new(AtomicBool::new(true)),
            detail: "ok".to_string(),
        }
    }

    pub(crate) fn down(detail: &str) -> Self {
        Self {
            ok: Arc::new(AtomicBool::new(false)),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn set_ok(&self, ok: bool) {
        self.ok.store(ok, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProbe for StubStorage {
    async fn check(&self) -> HealthResult {
        if self.ok.load(Ordering::SeqCst) {
            HealthResult::healthy(self.detail.clone())
        } else {
            HealthResult::unhealthy(self.detail.clone())
        }
    }
}

/// Alert sink that keeps every message it is given.
#[derive(Clone, Default)]
pub(crate) struct RecordingAlertSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingAlertSink {
    pub(crate) fn count(&self) -> usize {
        self.messages.lock().len()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}

pub(crate) struct StaticCredentials;

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        Ok(Credential::new("test-token", Duration::from_secs(3600)))
    }
}

pub(crate) struct FailingCredentials;

#[async_trait]
impl CredentialProvider for FailingCredentials {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        Err(CredentialError::Rejected { status: 401 })
    }
}

/// Resolves an in-memory API document, panicking on schema errors.
pub(crate) fn describe(document: Value) -> ApiDescription {
    SchemaResolver::new(Arc::new(MemoryLoader::new()))
        .resolve(RawDocument::new("memory.json", document))
        .unwrap()
}

/// Splits a JSON response into its status and parsed body.
pub(crate) async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub(crate) fn test_state() -> AppState {
    test_state_with(StubStorage::up()).0
}

/// State over `storage`, plus a handle on the alerts it sends.
pub(crate) fn test_state_with(storage: StubStorage) -> (AppState, RecordingAlertSink) {
    let alerts = RecordingAlertSink::default();
    let state = AppState {
        config: Arc::new(ServiceConfig::default()),
        storage: Arc::new(storage),
        alerts: Arc::new(alerts.clone()),
        api: Arc::new(describe(serde_json::json!({"paths": {}}))),
    };
    (state, alerts)
}

/// Log lines written while the returned guard is alive on this thread.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Installs a thread-local subscriber writing into the returned buffer.
    ///
    /// `#[tokio::test]` runs on a single thread, so spawned tasks are
    /// captured too.
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
