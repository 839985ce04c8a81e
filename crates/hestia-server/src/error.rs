//! Server and shutdown error types.

use std::time::Duration;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Errors raised while serving.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be set up.
    #[error("bind error: {0}")]
    Bind(String),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the HTTP protocol implementation.
    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    /// The driver lacks an optional capability.
    #[error("driver {driver} does not support {capability}")]
    UnsupportedCapability {
        /// Name of the driver.
        driver: &'static str,
        /// The missing capability.
        capability: &'static str,
    },

    /// The driver could not finish a graceful shutdown.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Result type alias using [`ServerError`].
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by the shutdown orchestrator.
///
/// Both the timeout and the aggregate failure are meant to be fatal: the
/// caller should exit with a non-zero status.
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// Listeners were still running when the deadline passed.
    #[error("shutdown did not complete after {}ms: {source}", .timeout.as_millis())]
    Timeout {
        /// The configured shutdown timeout.
        timeout: Duration,
        /// The elapsed deadline.
        source: Elapsed,
    },

    /// Every listener finished and none of them succeeded.
    #[error("shutdown completed with error")]
    AggregateFailure,

    /// Termination signals could not be received.
    #[error("failed to listen for signals: {0}")]
    Signal(#[source] std::io::Error),
}

impl ShutdownError {
    /// Returns `true` if the deadline passed before all listeners finished.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
