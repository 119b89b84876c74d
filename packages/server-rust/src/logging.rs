//! Process-wide structured logging.
//!
//! `RUST_LOG` wins when set. Otherwise the debug flag gates verbosity:
//! milestone messages are logged at `info` and always shown, progress
//! detail at `debug` only when the flag is on.

use std::backtrace::Backtrace;

use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Filter used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "info,ak_server=debug,ak_core=debug,tower_http=debug"
    } else {
        "info"
    }
}

/// Installs the global subscriber and the panic hook.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(debug: bool, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }
    install_panic_hook();
    Ok(())
}

/// Routes panics through `tracing` with a captured backtrace.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_default();
        let backtrace = Backtrace::force_capture();
        error!(%location, %message, %backtrace, "panic");
    }));
}
