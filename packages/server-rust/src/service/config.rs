//! Process configuration, read once from the environment at startup.
//!
//! [`ServiceArgs`] is the raw clap view (flags and environment variables).
//! [`ServiceConfig`] is the immutable value shared by every component.
//! Secrets stay in `ServiceArgs` and are handed only to the collaborator
//! that needs them.

use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;

use ak_core::{Contact, DocumentLoader, License, SchemaError, ServiceInfo, MAX_QUERY_SIZE};

use super::alert::{format_alert, AlertConfig};
use crate::auth::CredentialConfig;
use crate::logging::LogFormat;
use crate::network::{NetworkConfig, TlsConfig};

/// Name used in log lines and alert messages.
pub const SERVICE_NAME: &str = "AK-API";

/// Command-line flags, each backed by an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "ak-server", version, about = "AIRR Knowledge API service")]
pub struct ServiceArgs {
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    pub port: u16,
    /// `true` or `1` enables debug logging; anything else disables it.
    #[arg(
        long,
        env = "DEBUG_CONSOLE",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub debug: bool,
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
    #[arg(long, env = "SLACK_WEBHOOK_URL")]
    pub alert_webhook_url: Option<String>,
    #[arg(long, env = "ALERT_QUEUE_CAPACITY", default_value_t = 64)]
    pub alert_queue_capacity: usize,
    #[arg(long, env = "HOST_SERVICE_ACCOUNT")]
    pub host_service_account: Option<String>,
    #[arg(long, env = "HOST_SERVICE_GROUP")]
    pub host_service_group: Option<String>,
    #[arg(long, env = "API_DOCUMENT", default_value = "api/ak-api.yaml")]
    pub api_document: PathBuf,
    #[arg(long, env = "API_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,
    #[arg(long, env = "API_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "BOOTSTRAP_STEP_TIMEOUT_SECS", default_value_t = 30)]
    pub bootstrap_step_timeout_secs: u64,
    #[arg(long, env = "STORAGE_PROBE_TIMEOUT_SECS", default_value_t = 5)]
    pub storage_probe_timeout_secs: u64,
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,
    #[arg(long, env = "AUTH_TOKEN_URL")]
    pub auth_token_url: String,
    #[arg(long, env = "AUTH_SERVICE_ACCOUNT")]
    pub auth_service_account: String,
    #[arg(long, env = "AUTH_SERVICE_SECRET", hide_env_values = true)]
    pub auth_service_secret: String,
}

#[allow(clippy::unnecessary_wraps)]
fn parse_flag(value: &str) -> Result<bool, Infallible> {
    Ok(value == "true" || value == "1")
}

impl ServiceArgs {
    #[must_use]
    pub fn credential_config(&self) -> CredentialConfig {
        CredentialConfig {
            token_url: self.auth_token_url.clone(),
            username: self.auth_service_account.clone(),
            secret: self.auth_service_secret.clone(),
            request_timeout: Duration::from_secs(self.bootstrap_step_timeout_secs),
            refresh_margin: Duration::from_secs(60),
        }
    }

    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn storage_config(&self) -> crate::storage::StorageConfig {
        crate::storage::StorageConfig {
            database_url: self.database_url.clone(),
            probe_timeout: Duration::from_secs(self.storage_probe_timeout_secs),
            max_connections: 4,
        }
    }
}

/// Why the configuration could not be assembled.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read API document for service info: {0}")]
    ApiDocument(#[from] SchemaError),
    #[error("API_TLS_CERT and API_TLS_KEY must be set together")]
    IncompleteTls,
}

/// Immutable, process-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    /// Served verbatim by `GET /info`.
    pub info: ServiceInfo,
    pub debug: bool,
    pub alerts: AlertConfig,
    /// Host account/group for privilege downgrade. Recorded only.
    pub host_service_account: Option<String>,
    pub host_service_group: Option<String>,
    pub api_document: PathBuf,
    pub network: NetworkConfig,
    /// Upper bound for each external call in the bootstrap chain.
    pub bootstrap_step_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            info: package_info(Value::Null),
            debug: false,
            alerts: AlertConfig::default(),
            host_service_account: None,
            host_service_group: None,
            api_document: PathBuf::from("api/ak-api.yaml"),
            network: NetworkConfig::default(),
            bootstrap_step_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Builds the configuration, reading the API document's `info` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the API document cannot be loaded or only
    /// half of the TLS pair is given.
    pub fn from_args(args: &ServiceArgs, loader: &dyn DocumentLoader) -> Result<Self, ConfigError> {
        let tls = match (&args.tls_cert, &args.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let document = loader.load(&args.api_document.to_string_lossy())?;
        let api = document.info().cloned().unwrap_or(Value::Null);

        Ok(Self {
            name: SERVICE_NAME.to_string(),
            info: package_info(api),
            debug: args.debug,
            alerts: AlertConfig {
                webhook_url: args.alert_webhook_url.clone(),
                queue_capacity: args.alert_queue_capacity,
                ..AlertConfig::default()
            },
            host_service_account: args.host_service_account.clone(),
            host_service_group: args.host_service_group.clone(),
            api_document: args.api_document.clone(),
            network: NetworkConfig {
                host: args.host.clone(),
                port: args.port,
                tls,
                request_timeout: Duration::from_secs(args.request_timeout_secs),
                max_body_size: MAX_QUERY_SIZE,
            },
            bootstrap_step_timeout: Duration::from_secs(args.bootstrap_step_timeout_secs),
        })
    }

    /// Formats an operator alert attributed to this service.
    #[must_use]
    pub fn alert(&self, context: &str, message: &str) -> String {
        format_alert(&self.name, context, message)
    }
}

/// Service metadata from the package manifest plus the API `info` section.
#[must_use]
pub fn package_info(api: Value) -> ServiceInfo {
    ServiceInfo {
        title: env!("CARGO_PKG_NAME").to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        contact: Contact::default(),
        license: License {
            name: env!("CARGO_PKG_LICENSE").to_string(),
        },
        api,
        max_query_size: MAX_QUERY_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use ak_core::schema::MemoryLoader;
    use serde_json::json;

    use super::*;

    const REQUIRED: [&str; 9] = [
        "ak-server",
        "--database-url",
        "postgres://ak@localhost/ak",
        "--auth-token-url",
        "http://localhost/token",
        "--auth-service-account",
        "svc",
        "--auth-service-secret",
        "pw",
    ];

    fn args(extra: &[&str]) -> ServiceArgs {
        ServiceArgs::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    fn loader() -> MemoryLoader {
        MemoryLoader::new().with(
            "api/ak-api.yaml",
            json!({"info": {"title": "AK API", "version": "0.9.0"}}),
        )
    }

    #[test]
    fn debug_flag_parsing() {
        assert!(!args(&[]).debug);
        assert!(args(&["--debug", "true"]).debug);
        assert!(args(&["--debug", "1"]).debug);
        assert!(!args(&["--debug", "yes"]).debug);
    }

    #[test]
    fn builds_immutable_config_from_args() {
        let config = ServiceConfig::from_args(
            &args(&["--port", "9001", "--alert-webhook-url", "http://hooks/x"]),
            &loader(),
        )
        .unwrap();

        assert_eq!(config.name, "AK-API");
        assert_eq!(config.network.port, 9001);
        assert_eq!(config.network.max_body_size, MAX_QUERY_SIZE);
        assert_eq!(config.alerts.webhook_url.as_deref(), Some("http://hooks/x"));
        assert_eq!(config.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.info.api["version"], "0.9.0");
        assert_eq!(config.info.max_query_size, 2 * 1024 * 1024);
        assert!(config.host_service_account.is_none());
    }

    #[test]
    fn half_tls_pair_is_rejected() {
        let err = ServiceConfig::from_args(&args(&["--tls-cert", "/tmp/cert.pem"]), &loader())
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteTls));
    }

    #[test]
    fn missing_api_document_is_a_config_error() {
        let err = ServiceConfig::from_args(&args(&[]), &MemoryLoader::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ApiDocument(SchemaError::NotFound { .. })));
    }

    #[test]
    fn credential_config_carries_secret_only_to_provider() {
        let args = args(&[]);
        let credentials = args.credential_config();
        assert_eq!(credentials.username, "svc");
        assert_eq!(credentials.secret, "pw");
        assert!(!format!("{:?}", ServiceConfig::default()).contains("pw"));
    }

    #[test]
    fn alert_messages_are_attributed() {
        let config = ServiceConfig::default();
        assert_eq!(config.alert("app", "down"), "AK-API ERROR (app): down");
    }
}
