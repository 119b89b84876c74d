//! Networking: configuration, middleware, handlers and the listener lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::*;
pub use handlers::{default_handlers, AppState};
pub use module::{assemble_router, shutdown_signal, NetworkModule, StartError};
