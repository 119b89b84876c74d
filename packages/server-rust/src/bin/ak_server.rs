use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use ak_core::schema::FileLoader;
use ak_server::auth::OAuthCredentialProvider;
use ak_server::logging;
use ak_server::network::{default_handlers, shutdown_signal};
use ak_server::service::{Bootstrapper, Collaborators, ServiceArgs, ServiceConfig, WebhookAlertSink};
use ak_server::storage::PostgresProbe;
use ak_server::AlertSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = ServiceArgs::parse();
    logging::init(args.debug, args.log_format)?;

    let config = Arc::new(ServiceConfig::from_args(&args, &FileLoader)?);
    info!(
        version = %config.info.version,
        port = config.network.port,
        debug = config.debug,
        "Starting {}",
        config.name
    );
    match (&config.host_service_account, &config.host_service_group) {
        (Some(account), Some(group)) => {
            info!(account = %account, group = %group, "Host service account configured; privileges are not switched");
        }
        (None, None) => {}
        _ => warn!("HOST_SERVICE_ACCOUNT and HOST_SERVICE_GROUP should be set together"),
    }

    let alerts = Arc::new(WebhookAlertSink::start(&config.alerts)?);
    let bootstrapper = Bootstrapper::new(
        Arc::clone(&config),
        Collaborators {
            credentials: Arc::new(OAuthCredentialProvider::new(args.credential_config())?),
            storage: Arc::new(PostgresProbe::connect_lazy(&args.storage_config())?),
            documents: Arc::new(FileLoader),
            alerts: Arc::clone(&alerts) as Arc<dyn AlertSink>,
        },
    );

    // Any failure leaves the process up; the supervisor decides when to restart.
    match bootstrapper.run(default_handlers()).await {
        Ok(server) => {
            if let Err(e) = server.serve(shutdown_signal()).await {
                error!(error = ?e, "Server stopped unexpectedly. Waiting for a shutdown signal");
                alerts.notify(config.alert("app", &format!("API server stopped serving.\n{e:#}")));
                shutdown_signal().await;
            }
        }
        Err(e) => {
            error!("Bootstrap failed: {e}. Waiting for a shutdown signal");
            shutdown_signal().await;
        }
    }

    alerts.stop().await;
    info!("{} stopped", config.name);
    Ok(())
}
