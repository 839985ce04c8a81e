//! Panic recovery middleware.
//!
//! This middleware is the outermost stage. It runs everything below it under
//! `catch_unwind`, so a panicking handler never takes the serving task down.
//!
//! ## Fault Handling
//!
//! When the inner chain panics:
//!
//! 1. The [`AbortHandler`](hestia_core::AbortHandler) sentinel is swallowed
//!    silently: nothing is logged and no fault handler runs.
//! 2. Any other payload is normalized into a [`Fault`] (see
//!    [`Fault::from_panic`]), tagged with the panic location, and stored on
//!    the [`RequestContext`].
//! 3. The fault handler runs. The default one logs the fault and answers
//!    `500 Internal Server Error` with an empty body.

use crate::middleware::{Middleware, Next};
use futures_util::FutureExt;
use hestia_core::{
    install_location_hook, take_panic_location, BoxFuture, Fault, Handler, Request,
    RequestContext, ResponseWriter,
};
use http::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Middleware that recovers from panics in the handler chain.
///
/// # Example
///
/// ```
/// use hestia_core::{handler_fn, Handler};
/// use hestia_middleware::stages::RecoveryMiddleware;
/// use http::StatusCode;
///
/// // Answer faults with 503 instead of the default 500
/// let fault_handler = handler_fn(|ctx, _req, res| {
///     Box::pin(async move {
///         if let Some(fault) = ctx.fault() {
///             tracing::warn!(error = %fault, "Handler failed");
///         }
///         res.write_header(StatusCode::SERVICE_UNAVAILABLE);
///     })
/// });
///
/// let recovery = RecoveryMiddleware::with_fault_handler(fault_handler);
/// # let _ = recovery;
/// ```
#[derive(Clone)]
pub struct RecoveryMiddleware {
    fault_handler: Arc<dyn Handler>,
}

impl RecoveryMiddleware {
    /// Creates a recovery stage with the default fault handler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shared_fault_handler(Arc::new(DefaultFaultHandler))
    }

    /// Creates a recovery stage that delegates faults to `handler`.
    ///
    /// The handler reads the fault through [`RequestContext::fault`].
    #[must_use]
    pub fn with_fault_handler<H: Handler>(handler: H) -> Self {
        Self::with_shared_fault_handler(Arc::new(handler))
    }

    /// Creates a recovery stage around an already shared fault handler.
    #[must_use]
    pub fn with_shared_fault_handler(handler: Arc<dyn Handler>) -> Self {
        install_location_hook();
        Self {
            fault_handler: handler,
        }
    }
}

impl Default for RecoveryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecoveryMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx, request, response))
                .catch_unwind()
                .await;

            let Err(payload) = outcome else {
                return;
            };
            let location = take_panic_location();
            let Some(fault) = Fault::from_panic(payload) else {
                return;
            };
            ctx.set_fault(fault.with_location(location));

            let handled = AssertUnwindSafe(self.fault_handler.serve(ctx, request, response))
                .catch_unwind()
                .await;
            if handled.is_err() {
                tracing::error!(
                    location = ?take_panic_location(),
                    "Fault handler panicked"
                );
            }
        })
    }
}

/// The default fault handler.
///
/// Logs the fault recorded on the context, or `unknown panic` when there is
/// none, and answers `500 Internal Server Error` without a body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFaultHandler;

impl Handler for DefaultFaultHandler {
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match ctx.fault() {
                Some(fault) => match fault.location() {
                    Some(location) => {
                        tracing::error!(error = %fault, location = %location, "Panic occurred");
                    }
                    None => tracing::error!(error = %fault, "Panic occurred"),
                },
                None => tracing::error!(error = "unknown panic", "Panic occurred"),
            }
            response.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::fixtures::{request, RecordingWriter};
    use hestia_core::{abort_handler, handler_fn, FaultError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run_with(
        recovery: &RecoveryMiddleware,
        handler: &dyn Handler,
    ) -> (RequestContext, RecordingWriter) {
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        let mut writer = RecordingWriter::new();
        recovery
            .process(&mut ctx, &mut req, &mut writer, Next::handler(handler))
            .await;
        (ctx, writer)
    }

    #[tokio::test]
    async fn test_string_panic_becomes_500() {
        let recovery = RecoveryMiddleware::new();
        let handler = handler_fn(|_ctx, _req, _res| Box::pin(async { panic!("boom") }));

        let (ctx, writer) = run_with(&recovery, &handler).await;

        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(writer.body().is_empty());
        let fault = ctx.fault().unwrap();
        assert_eq!(fault.to_string(), "boom");
        assert_eq!(
            fault.downcast_ref::<FaultError>(),
            Some(&FaultError::Message("boom".to_string()))
        );
        assert!(fault.location().unwrap().file.ends_with("recovery.rs"));
    }

    #[tokio::test]
    async fn test_no_panic_passes_through() {
        let recovery = RecoveryMiddleware::new();
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.write_header(StatusCode::OK);
            })
        });

        let (ctx, writer) = run_with(&recovery, &handler).await;

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert!(ctx.fault().is_none());
    }

    #[tokio::test]
    async fn test_abort_is_swallowed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let recovery = RecoveryMiddleware::with_fault_handler(handler_fn(move |_ctx, _req, _res| {
            seen.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }));
        let handler = handler_fn(|_ctx, _req, _res| Box::pin(async { abort_handler() }));

        let (ctx, writer) = run_with(&recovery, &handler).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctx.fault().is_none());
        assert_eq!(writer.status(), None);
    }

    #[tokio::test]
    async fn test_custom_fault_handler_reads_fault() {
        let recovery = RecoveryMiddleware::with_fault_handler(handler_fn(|ctx, _req, res| {
            Box::pin(async move {
                let message = ctx.fault().map(ToString::to_string).unwrap_or_default();
                res.write_header(StatusCode::SERVICE_UNAVAILABLE);
                let _ = res.write_all(message.as_bytes());
            })
        }));
        let handler = handler_fn(|_ctx, _req, _res| {
            Box::pin(async { std::panic::panic_any(String::from("database unavailable")) })
        });

        let (_ctx, writer) = run_with(&recovery, &handler).await;

        assert_eq!(writer.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(writer.body(), b"database unavailable");
    }

    #[tokio::test]
    async fn test_panicking_fault_handler_is_contained() {
        let recovery = RecoveryMiddleware::with_fault_handler(handler_fn(|_ctx, _req, _res| {
            Box::pin(async { panic!("fault handler broke") })
        }));
        let handler = handler_fn(|_ctx, _req, _res| Box::pin(async { panic!("boom") }));

        let (ctx, _writer) = run_with(&recovery, &handler).await;

        assert_eq!(ctx.fault().unwrap().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_default_handler_without_fault() {
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        let mut writer = RecordingWriter::new();

        DefaultFaultHandler.serve(&mut ctx, &mut req, &mut writer).await;

        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(RecoveryMiddleware::new().name(), "recovery");
    }
}
