//! Request log middleware.
//!
//! Produces exactly one [`Entry`] per exchange, after everything below this
//! stage has returned.
//!
//! ## Behavior
//!
//! 1. Snapshot the request metadata (without the body) before the handler runs
//! 2. Wrap the request body in a [`CountingBody`] and the response sink in an
//!    [`InstrumentedResponse`]
//! 3. Run the rest of the chain
//! 4. Unless the body failed, was discarded, or the connection was hijacked,
//!    drain what the handler left unread so the size reflects what the client
//!    sent; read errors while draining are ignored
//! 5. Hand the entry to the [`RequestLogger`]
//!
//! A panic below this stage still produces its entry. The status is `500`
//! unless a header was already written, or `200` for the
//! [`AbortHandler`](hestia_core::AbortHandler) sentinel. The panic then
//! resumes so the recovery stage can answer.

use crate::counting::{BodyStats, CountingBody};
use crate::instrumented::InstrumentedResponse;
use crate::middleware::{Middleware, Next};
use crate::request_logger::{Entry, RequestLogger, RequestMeta, ResponseMeasurements};
use chrono::Utc;
use futures_util::FutureExt;
use hestia_core::{body, AbortHandler, BoxFuture, Request, RequestContext, ResponseWriter};
use http::StatusCode;
use http_body_util::BodyExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Middleware that emits one log entry per exchange.
#[derive(Clone)]
pub struct RequestLogMiddleware {
    logger: Arc<dyn RequestLogger>,
}

impl RequestLogMiddleware {
    /// Creates a request log stage writing to `logger`.
    #[must_use]
    pub fn new<L: RequestLogger>(logger: L) -> Self {
        Self {
            logger: Arc::new(logger),
        }
    }

    /// Creates a request log stage around an already shared logger.
    #[must_use]
    pub fn with_shared_logger(logger: Arc<dyn RequestLogger>) -> Self {
        Self { logger }
    }
}

impl std::fmt::Debug for RequestLogMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for RequestLogMiddleware {
    fn name(&self) -> &'static str {
        "request_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let start = Instant::now();
            let received_time = Utc::now();
            let meta = RequestMeta::capture(&*request, &*ctx);

            let stats = Arc::new(BodyStats::default());
            let original = body::take(request);
            *request.body_mut() = body::boxed(CountingBody::new(original, Arc::clone(&stats)));

            let mut instrumented = InstrumentedResponse::new(response);
            let panicked = AssertUnwindSafe(next.run(ctx, request, &mut instrumented))
                .catch_unwind()
                .await
                .err();
            let latency = start.elapsed();

            if panicked.is_none()
                && !stats.errored()
                && !stats.dropped()
                && !instrumented.is_hijacked()
            {
                drain(request).await;
            }

            let status = match (instrumented.status(), &panicked) {
                (Some(status), _) => status,
                (None, Some(payload)) if !payload.is::<AbortHandler>() => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                (None, _) => StatusCode::OK,
            };
            let (header_size, body_size) = instrumented.sizes();
            let measurements = ResponseMeasurements {
                status,
                header_size,
                body_size,
            };
            let entry = Entry::new(meta, received_time, stats.bytes(), measurements, latency)
                .with_trace(ctx.trace_id(), ctx.span_id());
            self.logger.log(&entry);

            if let Some(payload) = panicked {
                panic::resume_unwind(payload);
            }
        })
    }
}

/// Reads and discards the rest of the request body.
async fn drain(request: &mut Request) {
    while let Some(frame) = request.body_mut().frame().await {
        if frame.is_err() {
            break;
        }
    }
}
