//! Operator alerts posted to a Slack-style incoming webhook.
//!
//! `notify` only enqueues; a [`BackgroundWorker`] performs delivery. A full
//! queue or a failed post is logged locally and otherwise ignored.
//! [`WebhookAlertSink::stop`] flushes what is queued before the process
//! exits.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::worker::{BackgroundRunnable, BackgroundWorker};
use crate::traits::AlertSink;

/// Alert channel settings.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Incoming-webhook URL. `None` disables delivery.
    pub webhook_url: Option<String>,
    pub queue_capacity: usize,
    pub delivery_timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            queue_capacity: 64,
            delivery_timeout: Duration::from_secs(10),
        }
    }
}

/// Formats an alert the way it appears in the operator channel.
#[must_use]
pub fn format_alert(service_name: &str, context: &str, message: &str) -> String {
    format!("{service_name} ERROR ({context}): {message}")
}

/// [`AlertSink`] backed by a bounded queue and a delivery worker.
pub struct WebhookAlertSink {
    worker: Option<BackgroundWorker<WebhookDelivery>>,
    flush_timeout: Duration,
}

impl WebhookAlertSink {
    /// Starts the delivery worker. Must be called inside a tokio runtime.
    ///
    /// With no webhook configured no worker is started and alerts are only
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn start(config: &AlertConfig) -> Result<Self, reqwest::Error> {
        let Some(url) = config.webhook_url.clone() else {
            warn!("SLACK_WEBHOOK_URL is not set; alerts will only be logged");
            return Ok(Self {
                worker: None,
                flush_timeout: config.delivery_timeout,
            });
        };
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .build()?;
        let delivery = WebhookDelivery { client, url };
        Ok(Self {
            worker: Some(BackgroundWorker::start(delivery, config.queue_capacity.max(1))),
            flush_timeout: config.delivery_timeout,
        })
    }

    /// Stops accepting alerts and waits for queued ones to be delivered,
    /// for at most one delivery timeout.
    ///
    /// Returns `false` if alerts were still pending when the wait ended.
    pub async fn stop(&self) -> bool {
        let Some(worker) = &self.worker else {
            return true;
        };
        if tokio::time::timeout(self.flush_timeout, worker.stop()).await.is_ok() {
            debug!("alert queue flushed");
            true
        } else {
            warn!(timeout = ?self.flush_timeout, "alert queue not flushed before shutdown");
            false
        }
    }
}

impl AlertSink for WebhookAlertSink {
    fn notify(&self, message: String) {
        match &self.worker {
            Some(worker) => {
                if let Err(e) = worker.try_submit(message) {
                    warn!(error = %e, "dropping operator alert");
                }
            }
            None => debug!(alert = %message, "no alert channel configured"),
        }
    }
}

struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
}

#[async_trait]
impl BackgroundRunnable for WebhookDelivery {
    type Task = String;

    async fn run(&mut self, message: String) {
        let result = self
            .client
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => debug!("alert delivered"),
            Ok(response) => warn!(status = response.status().as_u16(), "alert webhook rejected message"),
            Err(e) => warn!(error = %e, "alert delivery failed"),
        }
    }
}
