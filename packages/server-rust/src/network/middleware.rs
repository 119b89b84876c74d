//! HTTP middleware stack for the `AK` service.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use crate::service::operation::OperationError;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET,PUT,POST,DELETE,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, Content-Length, X-Requested-With";

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            RequestBodyLimitLayer,
            tower::layer::util::Stack<
                CompressionLayer,
                tower::layer::util::Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    tower::layer::util::Stack<
                        SetRequestIdLayer<MakeRequestUuid>,
                        tower::layer::util::Identity,
                    >,
                >,
            >,
        >,
    >,
>;

/// Builds the transport-level Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id` to every request
/// 2. `Tracing` -- structured request/response spans
/// 3. `Compression` -- gzip responses
/// 4. `RequestBodyLimit` -- 413 for bodies over `max_body_size`
/// 5. `Timeout` -- 408 once `request_timeout` elapses
/// 6. `PropagateRequestId` -- echoes `X-Request-Id` on the response
///
/// CORS ([`cors_layers`], [`short_circuit_preflight`]) and the error
/// envelope ([`ensure_error_envelope`]) are applied separately so that they
/// wrap these layers and the fallback route too.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// The three CORS response-header layers produced by [`cors_layers`].
type CorsLayers = Stack<
    SetResponseHeaderLayer<HeaderValue>,
    Stack<SetResponseHeaderLayer<HeaderValue>, Stack<SetResponseHeaderLayer<HeaderValue>, Identity>>,
>;

/// Sets the permissive CORS headers on every response, replacing any value
/// a handler chose.
#[must_use]
pub fn cors_layers() -> CorsLayers {
    ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .into_inner()
}

/// `OPTIONS` requests never reach routing: they get an empty 200.
pub async fn short_circuit_preflight(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return Response::new(Body::empty());
    }
    next.run(request).await
}

/// Rewrites error responses that are not JSON into the `{message, status}`
/// envelope, keeping their status and headers.
///
/// Handler and fallback errors already carry the envelope; this covers
/// rejections raised by routing and the transport layers (405, 408, 413).
pub async fn ensure_error_envelope(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let message = format!("{}.", status.canonical_reason().unwrap_or("Request failed"));
    let (parts, _) = response.into_parts();
    let mut envelope = OperationError::with_status(status, message).into_response();
    for (name, value) in &parts.headers {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH && name != CONTENT_ENCODING {
            envelope.headers_mut().append(name.clone(), value.clone());
        }
    }
    envelope
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::routing::{any, get};
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn assert_cors(response: &Response) {
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET,PUT,POST,DELETE,OPTIONS");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization, Content-Length, X-Requested-With"
        );
    }

    #[test]
    fn build_http_layers_does_not_panic_with_defaults() {
        let _layers = build_http_layers(&NetworkConfig::default());
    }

    #[tokio::test]
    async fn options_short_circuits_before_routing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new()
            .route(
                "/status",
                any(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { "routed" }
                }),
            )
            .layer(axum::middleware::from_fn(short_circuit_preflight))
            .layer(cors_layers());

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_responses_carry_cors_headers() {
        let router = Router::new()
            .route(
                "/status",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        [(ACCESS_CONTROL_ALLOW_ORIGIN, "https://elsewhere.example")],
                        "no",
                    )
                }),
            )
            .layer(cors_layers());

        let response = router
            .oneshot(axum::http::Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = NetworkConfig {
            max_body_size: 16,
            ..NetworkConfig::default()
        };
        let router = Router::new()
            .route(
                "/echo",
                axum::routing::post(|body: axum::body::Bytes| async move { body.len().to_string() }),
            )
            .layer(build_http_layers(&config));

        let response = router
            .oneshot(
                axum::http::Request::post("/echo")
                    .header("content-length", "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    fn enveloped(router: Router, config: &NetworkConfig) -> Router {
        router
            .layer(build_http_layers(config))
            .layer(axum::middleware::map_response(ensure_error_envelope))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn wrong_method_gets_an_envelope_and_keeps_allow() {
        let router = enveloped(
            Router::new().route("/status", get(|| async { "ok" })),
            &NetworkConfig::default(),
        );

        let response = router
            .oneshot(axum::http::Request::delete("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key("allow"));
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "Method Not Allowed.", "status": 405})
        );
    }

    #[tokio::test]
    async fn oversized_body_gets_an_envelope() {
        let config = NetworkConfig {
            max_body_size: 16,
            ..NetworkConfig::default()
        };
        let router = enveloped(
            Router::new().route(
                "/echo",
                axum::routing::post(|body: axum::body::Bytes| async move { body.len().to_string() }),
            ),
            &config,
        );

        let response = router
            .oneshot(
                axum::http::Request::post("/echo")
                    .header("content-length", "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "Payload Too Large.", "status": 413})
        );
    }

    #[tokio::test]
    async fn json_errors_and_successes_pass_through() {
        let router = Router::new()
            .route(
                "/fail",
                get(|| async { OperationError::with_status(StatusCode::CONFLICT, "taken") }),
            )
            .route("/ok", get(|| async { "plain" }))
            .layer(axum::middleware::map_response(ensure_error_envelope));

        let response = router
            .clone()
            .oneshot(axum::http::Request::get("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "taken", "status": 409})
        );

        let response = router
            .oneshot(axum::http::Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"plain");
    }

    #[tokio::test]
    async fn slow_requests_time_out_with_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(20),
            ..NetworkConfig::default()
        };
        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(build_http_layers(&config));

        let response = router
            .oneshot(axum::http::Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(response.headers().contains_key("x-request-id"));

        let enveloped = ensure_error_envelope(response).await;
        assert_eq!(
            json_body(enveloped).await,
            serde_json::json!({"message": "Request Timeout.", "status": 408})
        );
    }
}
