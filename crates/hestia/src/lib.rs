//! # Hestia
//!
//! **A small HTTP server runtime with a fixed safety chain and graceful
//! shutdown.**
//!
//! - **Recovery** – a panicking handler answers `500` instead of killing the
//!   connection
//! - **Request logging** – one structured entry per exchange, with sensitive
//!   headers redacted
//! - **Write-error reporting** – failed response writes are logged
//! - **Trace context** – W3C `traceparent` ids flow into every log entry
//! - **Graceful shutdown** – on a termination signal every registered
//!   listener is stopped concurrently under one deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hestia::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(handler_fn(|_ctx, _req, res| {
//!         Box::pin(async move {
//!             let _ = res.write_all(b"Hello, world");
//!         })
//!     }));
//!
//!     let outcome = hestia::serve_until_signal(Arc::new(server)).await?;
//!     outcome.into_result()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Recovery → RequestLog → WriteError → Tracing → Handler
//!                                                             ↓
//! Response ← Recovery ← RequestLog ← WriteError ← Tracing ←───┘
//! ```

#![doc(html_root_url = "https://docs.rs/hestia/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

// Re-export core types
pub use hestia_core as core;

// Re-export server types
pub use hestia_server as server;

// Re-export middleware types
pub use hestia_middleware as middleware;

// Re-export logging setup
pub use hestia_telemetry as telemetry;

// Re-export configuration
pub use hestia_config as config;

use hestia_server::signal::{OsSignals, SignalSource};
use hestia_server::{Server, ServerError, Shutdown, ShutdownOutcome};

/// Name under which [`serve_until`] registers the server as a shutdown
/// listener.
pub const SERVER_LISTENER: &str = "http";

/// Serves `server` until SIGINT, SIGTERM or SIGHUP, then shuts it down
/// gracefully within the configured shutdown timeout.
///
/// # Errors
///
/// Returns the server error if serving fails before a signal arrives.
pub async fn serve_until_signal(server: Arc<Server>) -> Result<ShutdownOutcome, ServerError> {
    serve_until(server, OsSignals).await
}

/// Like [`serve_until_signal`], with signals read from `signals`.
///
/// # Errors
///
/// Returns the server error if serving fails, or stops, before a signal
/// arrives.
pub async fn serve_until<S: SignalSource>(
    server: Arc<Server>,
    signals: S,
) -> Result<ShutdownOutcome, ServerError> {
    let mut shutdown = Shutdown::builder(server.config().shutdown_timeout())
        .listener(SERVER_LISTENER, Arc::clone(&server))
        .signal_source(signals)
        .build();

    let serving = Arc::clone(&server);
    let mut serve = tokio::spawn(async move { serving.serve().await });

    // Once a signal is in hand the serve task is expected to end, so only the
    // signal is raced against it.
    let signal = tokio::select! {
        biased;
        signal = shutdown.next_signal() => signal,
        joined = &mut serve => return match joined {
            Ok(Ok(())) => Err(ServerError::Shutdown(
                "server stopped before a termination signal".to_string(),
            )),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ServerError::Shutdown(format!("server task failed: {e}"))),
        },
    };

    let outcome = shutdown.complete(signal).await;
    if outcome.signal().is_none() {
        serve.abort();
        return Ok(outcome);
    }
    match serve.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Server returned an error"),
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }
    Ok(outcome)
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use hestia::prelude::*;
/// ```
pub mod prelude {
    pub use hestia_core::{
        abort_handler, handler_fn, not_found, BoxError, BoxFuture, Capability, Handler, Request,
        RequestContext, ResponseWriter,
    };

    pub use hestia_middleware::{Entry, RequestLogger, TracingRequestLogger};

    pub use hestia_server::shutdown::listener_fn;
    pub use hestia_server::{
        HealthChecks, HyperDriver, Server, ServerConfig, ServerError, Shutdown, ShutdownContext,
        ShutdownError, ShutdownListener, ShutdownOutcome, Signal,
    };

    pub use hestia_config::{ConfigLoader, HestiaConfig};
    pub use hestia_telemetry::{init_logging, LogConfig, LogFormat};
}
