//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all middleware stages
//! implement. A stage receives the exchange context, the request, the response
//! sink and a [`Next`] callback. It may wrap the sink (to observe what the
//! handler writes) before handing control down the chain, and it regains
//! control once everything below it has returned.
//!
//! # Example
//!
//! ```
//! use hestia_core::{BoxFuture, Request, RequestContext, ResponseWriter};
//! use hestia_middleware::{Middleware, Next};
//!
//! struct LoggingMiddleware;
//!
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         request: &'a mut Request,
//!         response: &'a mut dyn ResponseWriter,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             tracing::debug!(path = %request.uri().path(), "Request");
//!             next.run(ctx, request, response).await;
//!         })
//!     }
//! }
//! ```

use hestia_core::{BoxFuture, Handler, Request, RequestContext, ResponseWriter};

/// The core middleware trait.
///
/// # Invariants
///
/// - Middleware MUST call `next.run()` at most once
/// - Middleware that wraps the response sink MUST forward every write to it
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Process the exchange through this middleware.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The per-exchange context
    /// * `request` - The incoming HTTP request
    /// * `response` - The response sink
    /// * `next` - Callback to invoke the next middleware
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()>;
}

/// Callback to invoke the next middleware in the chain.
///
/// This type is passed to middleware and consumed by [`Next::run`]. If it is
/// not called, the middleware short-circuits the chain.
pub struct Next<'a> {
    /// The remaining middleware chain
    inner: NextInner<'a>,
}

/// Internal representation of the next middleware chain.
enum NextInner<'a> {
    /// More middleware to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain - invoke the handler
    Handler(&'a dyn Handler),
}

impl<'a> Next<'a> {
    /// Creates a new `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler(handler: &'a dyn Handler) -> Self {
        Self {
            inner: NextInner::Handler(handler),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    ///
    /// This consumes `self` to ensure it can only be called once. The
    /// arguments may be borrowed for less than `'a`, so the caller can use
    /// them again once the returned future completes.
    pub fn run<'b>(
        self,
        ctx: &'b mut RequestContext,
        request: &'b mut Request,
        response: &'b mut dyn ResponseWriter,
    ) -> BoxFuture<'b, ()>
    where
        'a: 'b,
    {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, response, *next)
            }
            NextInner::Handler(handler) => handler.serve(ctx, request, response),
        }
    }
}

/// A middleware created from a closure.
///
/// Created by [`middleware_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(
            &'a mut RequestContext,
            &'a mut Request,
            &'a mut dyn ResponseWriter,
            Next<'a>,
        ) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        (self.func)(ctx, request, response, next)
    }
}

/// Creates a middleware from a closure.
///
/// # Example
///
/// ```
/// use hestia_middleware::middleware_fn;
///
/// let timing = middleware_fn("timing", |ctx, req, res, next| {
///     Box::pin(async move {
///         let start = std::time::Instant::now();
///         next.run(ctx, req, res).await;
///         tracing::debug!(elapsed = ?start.elapsed(), "Request took");
///     })
/// });
/// # let _ = timing;
/// ```
pub fn middleware_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(
            &'a mut RequestContext,
            &'a mut Request,
            &'a mut dyn ResponseWriter,
            Next<'a>,
        ) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware { name, func }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::fixtures::{request, RecordingWriter};
    use hestia_core::{handler_fn, NotFound};
    use http::StatusCode;

    struct TestMiddleware {
        name: &'static str,
    }

    impl Middleware for TestMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            request: &'a mut Request,
            response: &'a mut dyn ResponseWriter,
            next: Next<'a>,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                ctx.set_extension(format!("visited:{}", self.name));
                next.run(ctx, request, response).await;
            })
        }
    }

    #[tokio::test]
    async fn test_middleware_name() {
        let mw = TestMiddleware { name: "test" };
        assert_eq!(mw.name(), "test");
    }

    #[tokio::test]
    async fn test_next_handler() {
        let handler = NotFound;
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/test");
        let mut writer = RecordingWriter::new();

        Next::handler(&handler)
            .run(&mut ctx, &mut req, &mut writer)
            .await;

        assert_eq!(writer.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_middleware_chain() {
        let mw1 = TestMiddleware { name: "first" };
        let mw2 = TestMiddleware { name: "second" };
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.write_header(StatusCode::OK);
            })
        });

        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/test");
        let mut writer = RecordingWriter::new();

        let next = Next::new(&mw1, Next::new(&mw2, Next::handler(&handler)));
        next.run(&mut ctx, &mut req, &mut writer).await;

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(
            ctx.get_extension::<String>().map(String::as_str),
            Some("visited:second")
        );
    }

    #[tokio::test]
    async fn test_middleware_fn_can_short_circuit() {
        let deny = middleware_fn("deny", |_ctx, _req, res, _next| {
            Box::pin(async move {
                res.write_header(StatusCode::FORBIDDEN);
            })
        });
        let handler = NotFound;

        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        let mut writer = RecordingWriter::new();
        Next::new(&deny, Next::handler(&handler))
            .run(&mut ctx, &mut req, &mut writer)
            .await;

        assert_eq!(writer.status(), Some(StatusCode::FORBIDDEN));
    }
}
