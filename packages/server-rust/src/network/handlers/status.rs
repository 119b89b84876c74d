//! Liveness and service-info operations.

use axum::http::StatusCode;
use serde_json::json;
use tracing::{debug, error};

use super::AppState;
use crate::service::operation::{OperationResponse, OperationResult, INTERNAL_ERROR_MESSAGE};
use crate::service::request::OperationRequest;

const STATUS_CONTEXT: &str = "StatusController.getStatus";

/// `GET /status`: probes storage on every call.
///
/// A failed probe answers 500 with a generic message and sends one alert.
/// The probe detail only goes to the log and the alert channel.
pub async fn get_status(state: AppState, _request: OperationRequest) -> OperationResult {
    let health = state.storage.check().await;
    if health.ok {
        debug!(timestamp = health.timestamp, "Storage probe succeeded");
        return Ok(OperationResponse::ok(json!({"result": "success"})));
    }

    error!(detail = %health.detail, "Storage probe failed");
    state.alerts.notify(state.config.alert(
        STATUS_CONTEXT,
        &format!("Could not connect to database.\n{}", health.detail),
    ));
    Ok(OperationResponse::with_status(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"message": INTERNAL_ERROR_MESSAGE}),
    ))
}

/// `GET /info`: service metadata, independent of dependency state.
pub async fn get_info(state: AppState, _request: OperationRequest) -> OperationResult {
    let body = serde_json::to_value(&state.config.info).map_err(anyhow::Error::from)?;
    Ok(OperationResponse::ok(body))
}
