//! Health check endpoints.
//!
//! Health endpoints are mounted beside the handler chain, so probes are
//! neither request-logged nor traced.
//!
//! # Endpoints
//!
//! - `/healthz/liveness` - Always `200 ok` while the process serves requests.
//! - `/healthz/readiness` - `200 ok` when every registered check passes,
//!   otherwise `503` listing the failing checks.
//!
//! # Example
//!
//! ```rust
//! use hestia_server::HealthChecks;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let db_up = Arc::new(AtomicBool::new(true));
//! let probe = Arc::clone(&db_up);
//! let checks = HealthChecks::new().add_check("database", move || probe.load(Ordering::SeqCst));
//! assert!(checks.is_ready());
//!
//! db_up.store(false, Ordering::SeqCst);
//! assert_eq!(checks.failing(), ["database"]);
//! ```

use hestia_core::{BoxFuture, Handler, Request, RequestContext, ResponseWriter};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, StatusCode};
use std::sync::Arc;

/// Path prefix reserved for health endpoints.
pub const HEALTH_PREFIX: &str = "/healthz/";

/// Liveness probe path.
pub const LIVENESS_PATH: &str = "/healthz/liveness";

/// Readiness probe path.
pub const READINESS_PATH: &str = "/healthz/readiness";

/// A readiness check function.
type CheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Named readiness checks.
#[derive(Clone, Default)]
pub struct HealthChecks {
    checks: Vec<(String, CheckFn)>,
}

impl std::fmt::Debug for HealthChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecks")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl HealthChecks {
    /// Creates an empty set. With no checks the service is always ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a check that returns `true` while its component is ready.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Returns the number of registered checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns `true` if no check is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check and returns the names of those that failed, in
    /// registration order.
    #[must_use]
    pub fn failing(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, check)| !check())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns `true` if every check passes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|(_, check)| check())
    }
}

fn write_plain(response: &mut dyn ResponseWriter, status: StatusCode, body: &str) {
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    response.write_header(status);
    if let Err(e) = response.write_all(body.as_bytes()) {
        tracing::debug!(error = %e, "Failed to write health response");
    }
}

/// Handler for [`LIVENESS_PATH`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Liveness;

impl Handler for Liveness {
    fn serve<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
        _request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            write_plain(response, StatusCode::OK, "ok");
        })
    }
}

/// Handler for [`READINESS_PATH`].
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    checks: HealthChecks,
}

impl Readiness {
    /// Creates a readiness handler running `checks`.
    #[must_use]
    pub fn new(checks: HealthChecks) -> Self {
        Self { checks }
    }

    /// Returns the checks run by this handler.
    #[must_use]
    pub fn checks(&self) -> &HealthChecks {
        &self.checks
    }
}

impl Handler for Readiness {
    fn serve<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
        _request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let failing = self.checks.failing();
            if failing.is_empty() {
                write_plain(response, StatusCode::OK, "ok");
            } else {
                tracing::warn!(checks = ?failing, "Readiness checks failed");
                let body = format!("unhealthy: {}", failing.join(", "));
                write_plain(response, StatusCode::SERVICE_UNAVAILABLE, &body);
            }
        })
    }
}
