//! Handler trait for request processing.
//!
//! The [`Handler`] trait is the single abstraction the runtime composes:
//! application code implements it, every middleware stage wraps one, and the
//! driver calls one per exchange.

use crate::body::Body;
use crate::context::RequestContext;
use crate::response::ResponseWriter;
use http::StatusCode;
use std::future::Future;
use std::pin::Pin;

/// A boxed future, as returned by handlers and middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The HTTP request type used in the handler chain.
pub type Request = http::Request<Body>;

/// A request handler.
///
/// A handler receives the per-exchange context, the request and the response
/// sink. It writes its response through the sink and returns once the response
/// is complete. The request is borrowed mutably so that outer stages still own
/// it after the handler returns (the request log drains the unread body, for
/// instance).
///
/// # Example
///
/// ```
/// use hestia_core::{BoxFuture, Handler, Request, RequestContext, ResponseWriter};
/// use http::StatusCode;
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn serve<'a>(
///         &'a self,
///         _ctx: &'a mut RequestContext,
///         _request: &'a mut Request,
///         response: &'a mut dyn ResponseWriter,
///     ) -> BoxFuture<'a, ()> {
///         Box::pin(async move {
///             response.write_header(StatusCode::OK);
///             let _ = response.write(b"Hello");
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Serves one exchange.
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()>;
}

impl<H: Handler + ?Sized> Handler for std::sync::Arc<H> {
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        (**self).serve(ctx, request, response)
    }
}

/// A handler created from a closure.
///
/// Created by [`handler_fn`].
pub struct FnHandler<F> {
    func: F,
}

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(
            &'a mut RequestContext,
            &'a mut Request,
            &'a mut dyn ResponseWriter,
        ) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        (self.func)(ctx, request, response)
    }
}

/// Creates a handler from a closure returning a boxed future.
///
/// # Example
///
/// ```
/// use hestia_core::handler_fn;
/// use http::StatusCode;
///
/// let handler = handler_fn(|_ctx, _req, res| {
///     Box::pin(async move {
///         res.write_header(StatusCode::NO_CONTENT);
///     })
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: for<'a> Fn(
            &'a mut RequestContext,
            &'a mut Request,
            &'a mut dyn ResponseWriter,
        ) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    FnHandler { func }
}

/// Handler that answers every request with `404 page not found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn serve<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
        _request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response.headers_mut().insert(
                http::header::X_CONTENT_TYPE_OPTIONS,
                http::HeaderValue::from_static("nosniff"),
            );
            response.write_header(StatusCode::NOT_FOUND);
            if let Err(e) = response.write_all(b"404 page not found\n") {
                tracing::debug!(error = %e, "Failed to write not found response");
            }
        })
    }
}

/// Returns the default "not found" handler.
#[must_use]
pub const fn not_found() -> NotFound {
    NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{request, RecordingWriter};

    #[tokio::test]
    async fn test_not_found_handler() {
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/missing");
        let mut writer = RecordingWriter::new();

        NotFound.serve(&mut ctx, &mut req, &mut writer).await;

        assert_eq!(writer.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(writer.body(), b"404 page not found\n");
    }

    #[tokio::test]
    async fn test_handler_fn() {
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.write_header(StatusCode::ACCEPTED);
            })
        });

        let mut ctx = RequestContext::new();
        let mut req = request("POST", "/jobs");
        let mut writer = RecordingWriter::new();
        handler.serve(&mut ctx, &mut req, &mut writer).await;

        assert_eq!(writer.status(), Some(StatusCode::ACCEPTED));
    }

    #[tokio::test]
    async fn test_arc_handler_delegates() {
        let handler: std::sync::Arc<dyn Handler> = std::sync::Arc::new(NotFound);
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        let mut writer = RecordingWriter::new();
        handler.serve(&mut ctx, &mut req, &mut writer).await;
        assert_eq!(writer.status(), Some(StatusCode::NOT_FOUND));
    }
}
