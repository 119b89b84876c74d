//! Request data handed to operation handlers, and the check of that data
//! against the parameters an operation declares.

use std::collections::HashMap;

use axum::extract::{FromRequestParts, Path, Query, Request};
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use ak_core::{DeclaredOperation, DeclaredParameter, ParameterLocation};

use super::operation::OperationError;

/// Path parameters, query string, headers and JSON body of one request.
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    path_params: HashMap<String, String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Option<Value>,
}

impl OperationRequest {
    /// Splits an HTTP request into handler inputs.
    ///
    /// The body limit is enforced by the transport layers before this runs.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`OperationError`] for a malformed query string, an
    /// unreadable body, or a body that is not JSON.
    pub async fn from_http(request: Request) -> Result<Self, OperationError> {
        let (mut parts, body) = request.into_parts();

        // Routes without captures have no path parameters to extract.
        let path_params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|_| bad_request("Malformed query string."))?;

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|_| bad_request("Could not read request body."))?;
        let body = if bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes)
                    .map_err(|_| bad_request("Request body is not valid JSON."))?,
            )
        };

        Ok(Self {
            path_params,
            query,
            headers: parts.headers,
            body,
        })
    }

    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    fn has_cookie(&self, name: &str) -> bool {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .any(|pair| pair.trim().split('=').next() == Some(name))
    }

    fn carries(&self, parameter: &DeclaredParameter) -> bool {
        match parameter.location {
            ParameterLocation::Path => self.path_params.contains_key(&parameter.name),
            ParameterLocation::Query => self.query.contains_key(&parameter.name),
            ParameterLocation::Header => self.headers.contains_key(parameter.name.as_str()),
            ParameterLocation::Cookie => self.has_cookie(&parameter.name),
        }
    }
}

/// What an operation requires of every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContract {
    required: Vec<DeclaredParameter>,
    body_required: bool,
}

impl RequestContract {
    #[must_use]
    pub fn from_declared(operation: &DeclaredOperation) -> Self {
        Self {
            required: operation
                .parameters
                .iter()
                .filter(|p| p.required)
                .cloned()
                .collect(),
            body_required: operation.request_body_required,
        }
    }

    /// Checks that every required parameter and body is present.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`OperationError`] naming the first missing input.
    pub fn check(&self, request: &OperationRequest) -> Result<(), OperationError> {
        if let Some(missing) = self.required.iter().find(|p| !request.carries(p)) {
            return Err(bad_request(format!(
                "Missing required {} parameter '{}'.",
                missing.location.as_str(),
                missing.name
            )));
        }
        if self.body_required && request.body.is_none() {
            return Err(bad_request("Missing required request body."));
        }
        Ok(())
    }
}

fn bad_request(message: impl Into<String>) -> OperationError {
    OperationError::with_status(StatusCode::BAD_REQUEST, message)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use serde_json::json;

    use super::*;

    fn contract(parameters: Value, body_required: bool) -> RequestContract {
        let parameters = parameters
            .as_array()
            .unwrap()
            .iter()
            .map(|p| DeclaredParameter {
                name: p["name"].as_str().unwrap().to_string(),
                location: match p["in"].as_str().unwrap() {
                    "path" => ParameterLocation::Path,
                    "header" => ParameterLocation::Header,
                    "cookie" => ParameterLocation::Cookie,
                    _ => ParameterLocation::Query,
                },
                required: p["required"].as_bool().unwrap_or(false),
            })
            .collect();
        RequestContract::from_declared(&DeclaredOperation {
            method: "get".to_string(),
            path: "/x".to_string(),
            operation_id: None,
            parameters,
            request_body_required: body_required,
        })
    }

    #[tokio::test]
    async fn reads_query_headers_and_json_body() {
        let request = axum::http::Request::post("/widgets?limit=5&q=a%20b")
            .header("x-trace", "abc")
            .body(Body::from(r#"{"name": "w"}"#))
            .unwrap();

        let request = OperationRequest::from_http(request).await.unwrap();

        assert_eq!(request.query("limit"), Some("5"));
        assert_eq!(request.query("q"), Some("a b"));
        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(request.body(), Some(&json!({"name": "w"})));
        assert_eq!(request.path_param("id"), None);
    }

    #[tokio::test]
    async fn non_json_body_is_a_bad_request() {
        let request = axum::http::Request::post("/widgets")
            .body(Body::from("not json"))
            .unwrap();

        let err = OperationRequest::from_http(request).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.envelope().message, "Request body is not valid JSON.");
    }

    #[test]
    fn missing_required_query_parameter_is_rejected() {
        let contract = contract(
            json!([
                {"name": "limit", "in": "query", "required": true},
                {"name": "q", "in": "query"}
            ]),
            false,
        );

        let err = contract.check(&OperationRequest::default()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.envelope().message, "Missing required query parameter 'limit'.");

        assert!(contract
            .check(&OperationRequest::default().with_query("limit", "10"))
            .is_ok());
    }

    #[test]
    fn missing_required_body_is_rejected() {
        let contract = contract(json!([]), true);

        let err = contract.check(&OperationRequest::default()).unwrap_err();
        assert_eq!(err.envelope().message, "Missing required request body.");
        assert!(contract
            .check(&OperationRequest::default().with_body(json!({})))
            .is_ok());
    }

    #[tokio::test]
    async fn cookie_parameters_are_found_in_the_cookie_header() {
        let contract = contract(json!([{"name": "session", "in": "cookie", "required": true}]), false);
        let request = axum::http::Request::get("/x")
            .header("cookie", "theme=dark; session=s1")
            .body(Body::empty())
            .unwrap();

        let request = OperationRequest::from_http(request).await.unwrap();

        assert!(contract.check(&request).is_ok());
        assert!(contract.check(&OperationRequest::default()).is_err());
    }
}
