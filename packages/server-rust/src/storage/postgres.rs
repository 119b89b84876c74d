//! `PostgreSQL` connectivity probe.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use ak_core::HealthResult;

use crate::traits::StorageProbe;

/// Connection settings for the probe.
#[derive(Clone)]
pub struct StorageConfig {
    /// `postgres://` connection string. Contains credentials; never logged.
    pub database_url: String,
    /// Upper bound for one probe round-trip, including connection setup.
    pub probe_timeout: Duration,
    pub max_connections: u32,
}

/// Runs `SELECT 1` against a lazily connected pool.
///
/// The pool connects on first use, so constructing the probe never touches
/// the network and a database restart is picked up by the next check.
pub struct PostgresProbe {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresProbe {
    /// Creates the probe without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed.
    pub fn connect_lazy(config: &StorageConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.probe_timeout)
            .connect_lazy(&config.database_url)?;
        Ok(Self {
            pool,
            timeout: config.probe_timeout,
        })
    }
}

#[async_trait]
impl StorageProbe for PostgresProbe {
    async fn check(&self) -> HealthResult {
        let query = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(_)) => {
                debug!("storage probe succeeded");
                HealthResult::healthy("SELECT 1 succeeded")
            }
            Ok(Err(e)) => HealthResult::unhealthy(format!("database error: {e}")),
            Err(_) => HealthResult::unhealthy(format!(
                "database did not answer within {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}
