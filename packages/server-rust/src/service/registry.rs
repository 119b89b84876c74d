//! Binding of declared API operations to typed handlers.
//!
//! [`OperationRegistry::register`] checks every operation in the resolved
//! description against a [`HandlerTable`] before binding anything, so a
//! misconfigured table never yields a partially routed service.
//!
//! Every bound handler runs behind the same wrapper: the request is checked
//! against the operation's declared parameters, the handler runs under
//! `catch_unwind`, and any fault is logged and turned into the error
//! envelope.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use ak_core::ApiDescription;

use super::operation::{OperationError, OperationId, OperationResult};
use super::request::{OperationRequest, RequestContract};
use crate::network::AppState;

/// Type-erased async handler for one operation.
pub type BoxedHandler =
    Arc<dyn Fn(AppState, OperationRequest) -> BoxFuture<'static, OperationResult> + Send + Sync>;

// ---------------------------------------------------------------------------
// HandlerTable
// ---------------------------------------------------------------------------

/// Handlers keyed by [`OperationId`].
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<OperationId, BoxedHandler>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `operation`, replacing any previous entry.
    pub fn insert<F, Fut>(&mut self, operation: OperationId, handler: F)
    where
        F: Fn(AppState, OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.handlers
            .insert(operation, Arc::new(move |state, request| handler(state, request).boxed()));
    }

    #[must_use]
    pub fn with<F, Fut>(mut self, operation: OperationId, handler: F) -> Self
    where
        F: Fn(AppState, OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.insert(operation, handler);
        self
    }

    #[must_use]
    pub fn contains(&self, operation: OperationId) -> bool {
        self.handlers.contains_key(&operation)
    }

    fn get(&self, operation: OperationId) -> Option<BoxedHandler> {
        self.handlers.get(&operation).cloned()
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// One declared operation bound to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationBinding {
    pub operation: OperationId,
    pub method: Method,
    pub path: String,
}

/// Routes for every declared operation, waiting for shared state.
pub struct BoundRouter {
    router: Router<AppState>,
    bindings: Vec<OperationBinding>,
}

impl BoundRouter {
    #[must_use]
    pub fn bindings(&self) -> &[OperationBinding] {
        &self.bindings
    }

    /// Attaches the shared state, producing a servable router.
    pub fn into_router(self, state: AppState) -> Router {
        self.router.with_state(state)
    }
}

/// Why the declared operations could not be bound.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{method} {path} declares no operationId")]
    MissingOperationId { method: String, path: String },
    #[error("operationId {operation_id} is declared more than once")]
    DuplicateOperation { operation_id: String },
    #[error("operation {operation_id} ({method} {path}) has no handler")]
    UnhandledOperation {
        operation_id: String,
        method: String,
        path: String,
    },
    #[error("unsupported method {method} on {path}")]
    UnsupportedMethod { method: String, path: String },
    #[error("path {path} cannot be routed: {reason}")]
    InvalidPath { path: String, reason: String },
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

pub struct OperationRegistry;

impl OperationRegistry {
    /// Binds every operation in `description` to its handler in `handlers`.
    ///
    /// The table must cover every declared operation; an operation without
    /// a handler (including an `operationId` this service does not know)
    /// fails the whole registration.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`] found. Nothing is bound on error.
    pub fn register(
        description: &ApiDescription,
        handlers: &HandlerTable,
    ) -> Result<BoundRouter, RegistrationError> {
        let mut seen = HashSet::new();
        let mut shapes: HashMap<String, String> = HashMap::new();
        let mut plan = Vec::new();

        for declared in description.operations() {
            let Some(operation_id) = declared.operation_id.clone() else {
                return Err(RegistrationError::MissingOperationId {
                    method: declared.method,
                    path: declared.path,
                });
            };
            if !seen.insert(operation_id.clone()) {
                return Err(RegistrationError::DuplicateOperation { operation_id });
            }

            let shape =
                route_shape(&declared.path).map_err(|reason| RegistrationError::InvalidPath {
                    path: declared.path.clone(),
                    reason,
                })?;
            match shapes.get(&shape) {
                Some(existing) if *existing != declared.path => {
                    return Err(RegistrationError::InvalidPath {
                        path: declared.path,
                        reason: format!("conflicts with {existing}"),
                    });
                }
                Some(_) => {}
                None => {
                    shapes.insert(shape, declared.path.clone());
                }
            }

            let method = Method::from_bytes(declared.method.to_ascii_uppercase().as_bytes())
                .ok()
                .filter(|m| MethodFilter::try_from(m.clone()).is_ok());
            let Some(method) = method else {
                return Err(RegistrationError::UnsupportedMethod {
                    method: declared.method,
                    path: declared.path,
                });
            };

            let bound = operation_id
                .parse::<OperationId>()
                .ok()
                .and_then(|op| handlers.get(op).map(|handler| (op, handler)));
            let Some((operation, handler)) = bound else {
                return Err(RegistrationError::UnhandledOperation {
                    operation_id,
                    method: declared.method,
                    path: declared.path,
                });
            };

            let contract = Arc::new(RequestContract::from_declared(&declared));
            plan.push((
                OperationBinding {
                    operation,
                    method,
                    path: declared.path,
                },
                handler,
                contract,
            ));
        }

        for operation in OperationId::ALL {
            if handlers.contains(operation) && !seen.contains(operation.as_str()) {
                warn!(operation = %operation, "handler not declared in API description; not routed");
            }
        }

        let mut routes: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        let mut bindings = Vec::with_capacity(plan.len());
        for (binding, handler, contract) in plan {
            let Ok(filter) = MethodFilter::try_from(binding.method.clone()) else {
                continue; // filtered during validation
            };
            let operation = binding.operation;
            let endpoint = move |State(state): State<AppState>, request: Request| {
                let handler = Arc::clone(&handler);
                let contract = Arc::clone(&contract);
                async move { invoke(operation, handler, &contract, state, request).await }
            };
            let method_router = routes.remove(&binding.path).unwrap_or_default();
            routes.insert(binding.path.clone(), method_router.on(filter, endpoint));

            debug!(operation = %operation, method = %binding.method, path = %binding.path, "bound operation");
            bindings.push(binding);
        }

        // The router rejects some shapes by panicking; anything route_shape
        // let through still surfaces as an error here.
        let router = std::panic::catch_unwind(AssertUnwindSafe(move || {
            routes
                .into_iter()
                .fold(Router::new(), |router, (path, method_router)| {
                    router.route(&path, method_router)
                })
        }))
        .map_err(|payload| RegistrationError::InvalidPath {
            path: bindings
                .iter()
                .map(|b| b.path.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            reason: panic_message(payload.as_ref()),
        })?;

        info!(operations = bindings.len(), "registered API operations");
        Ok(BoundRouter { router, bindings })
    }
}

/// Normalizes `path` to its routing shape, with every `{name}` capture
/// collapsed to `{}`.
///
/// Two paths with the same shape cannot both be routed.
fn route_shape(path: &str) -> Result<String, String> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("must start with '/'".to_string());
    };

    let mut shape = String::with_capacity(path.len());
    for segment in rest.split('/') {
        shape.push('/');
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(format!("segment '{segment}' uses an unsupported capture syntax"));
        }
        if segment.contains(['{', '}']) {
            let name = segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .filter(|name| !name.is_empty() && !name.contains(['{', '}']));
            if name.is_none() {
                return Err(format!("segment '{segment}' is not a single {{name}} capture"));
            }
            shape.push_str("{}");
        } else {
            shape.push_str(segment);
        }
    }
    Ok(shape)
}

/// Runs one handler, logging and translating any fault it raises.
///
/// This is the only place uncaught handler faults are observed; the panic
/// hook installed by [`crate::logging`] records the panic backtrace.
async fn invoke(
    operation: OperationId,
    handler: BoxedHandler,
    contract: &RequestContract,
    state: AppState,
    request: Request,
) -> Response {
    let started = Instant::now();
    let result = match OperationRequest::from_http(request).await {
        Ok(request) => match contract.check(&request) {
            Ok(()) => AssertUnwindSafe(handler(state, request))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(OperationError::Panicked(panic_message(payload.as_ref())))
                }),
            Err(rejected) => Err(rejected),
        },
        Err(rejected) => Err(rejected),
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(response) => {
            debug!(
                operation = %operation,
                status = response.status().as_u16(),
                elapsed_ms,
                "operation completed"
            );
            response.into_response()
        }
        Err(err) if err.status().is_client_error() => {
            warn!(
                operation = %operation,
                status = err.status().as_u16(),
                elapsed_ms,
                error = %err,
                "operation rejected request"
            );
            err.into_response()
        }
        Err(err) => {
            error!(
                operation = %operation,
                status = err.status().as_u16(),
                elapsed_ms,
                error = ?err,
                "operation failed"
            );
            err.into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
