//! Operation identifiers, handler results, and the uniform error envelope.
//!
//! Handlers return [`OperationResult`]; the single translation to HTTP lives
//! in the `IntoResponse` impls below.

use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-visible message for faults whose detail must stay server-side.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal service error.";

/// Every operation this service can bind, keyed by its schema `operationId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationId {
    GetServiceStatus,
    GetServiceInfo,
}

impl OperationId {
    pub const ALL: [OperationId; 2] = [Self::GetServiceStatus, Self::GetServiceInfo];

    /// The `operationId` used in the API description.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetServiceStatus => "get_service_status",
            Self::GetServiceInfo => "get_service_info",
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `operationId` that no [`OperationId`] variant matches.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for OperationId {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Successful handler output: a status code and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    status: StatusCode,
    body: Value,
}

impl OperationResponse {
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    #[must_use]
    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl IntoResponse for OperationResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub status: u16,
}

/// Structured handler failure.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A fault that already knows its client-facing status and message.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    /// Unexpected fault; detail is logged, never sent to the client.
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
    /// The handler panicked; the payload message is logged only.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Internal(_) | Self::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-visible envelope. Internal detail is replaced by
    /// [`INTERNAL_ERROR_MESSAGE`].
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        let message = match self {
            Self::Status { message, .. } => message.clone(),
            Self::Internal(_) | Self::Panicked(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        };
        ErrorEnvelope {
            message,
            status: self.status().as_u16(),
        }
    }
}

impl IntoResponse for OperationError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

pub type OperationResult = Result<OperationResponse, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_ids_round_trip_through_schema_names() {
        for op in OperationId::ALL {
            assert_eq!(op.as_str().parse::<OperationId>().unwrap(), op);
        }
        assert_eq!(
            "getWidget".parse::<OperationId>().unwrap_err(),
            UnknownOperation("getWidget".to_string())
        );
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = OperationError::from(anyhow::anyhow!("connection string postgres://secret"));
        let envelope = err.envelope();
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn status_errors_keep_their_status_and_message() {
        let err = OperationError::with_status(StatusCode::BAD_REQUEST, "bad filter");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.envelope(),
            ErrorEnvelope {
                message: "bad filter".to_string(),
                status: 400
            }
        );
    }

    #[test]
    fn panics_map_to_server_error() {
        let err = OperationError::Panicked("boom".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.envelope().message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn response_accessors() {
        let response = OperationResponse::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"message": INTERNAL_ERROR_MESSAGE}),
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body()["message"], INTERNAL_ERROR_MESSAGE);
    }
}
