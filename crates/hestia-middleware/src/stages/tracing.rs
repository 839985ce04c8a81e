//! Tracing middleware.
//!
//! This middleware establishes trace correlation for each exchange. It reads
//! the trace context propagated by the caller, assigns a fresh span id, stores
//! both on the [`RequestContext`] and runs the rest of the chain inside a
//! `tracing` span carrying them.
//!
//! ## Trace Context Propagation
//!
//! Supports the [W3C Trace Context](https://www.w3.org/TR/trace-context/)
//! `traceparent` header. When it is absent or malformed, a new trace id is
//! generated.

use crate::middleware::{Middleware, Next};
use hestia_core::{BoxFuture, Request, RequestContext, ResponseWriter, SpanId, TraceId};
use tracing::Instrument;

/// The W3C Trace Context header for trace propagation.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Middleware that assigns trace and span ids to each exchange.
///
/// # Behavior
///
/// 1. Extract trace context from the `traceparent` header if present
/// 2. Generate a new trace id if not propagated
/// 3. Create a new span id for this exchange
/// 4. Store the ids on the [`RequestContext`] and the parsed
///    [`TraceContext`] as an extension
/// 5. Run the inner chain inside an `http.request` span
#[derive(Debug, Clone)]
pub struct TracingMiddleware {
    /// The service name recorded on the span.
    service_name: String,
}

impl TracingMiddleware {
    /// Creates a new tracing middleware.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Extracts trace context from the `traceparent` header.
    fn extract_trace_context(request: &Request) -> Option<TraceContext> {
        let header = request.headers().get(TRACEPARENT_HEADER)?;
        let value = header.to_str().ok()?;
        TraceContext::parse(value)
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let trace_context =
                Self::extract_trace_context(request).unwrap_or_else(|| TraceContext {
                    trace_id: TraceId::generate(),
                    parent_span_id: None,
                    flags: TraceFlags::SAMPLED,
                });
            let span_id = SpanId::generate();

            ctx.set_trace_id(trace_context.trace_id);
            ctx.set_span_id(span_id);

            let span = tracing::info_span!(
                "http.request",
                service = %self.service_name,
                http.method = %request.method(),
                http.target = %request.uri().path(),
                trace_id = %trace_context.trace_id,
                span_id = %span_id,
            );
            ctx.set_extension(trace_context);

            next.run(ctx, request, response).instrument(span).await;
        })
    }
}

/// Parsed trace context from the `traceparent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    /// The trace id.
    pub trace_id: TraceId,
    /// The caller's span id, when propagated.
    pub parent_span_id: Option<SpanId>,
    /// Trace flags (sampling, etc.).
    pub flags: TraceFlags,
}

impl TraceContext {
    /// Parses a `traceparent` header value.
    ///
    /// Format: `{version}-{trace-id}-{parent-span-id}-{flags}`
    ///
    /// # Example
    ///
    /// ```
    /// use hestia_middleware::stages::tracing::TraceContext;
    ///
    /// let ctx = TraceContext::parse("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
    ///     .unwrap();
    /// assert!(ctx.flags.is_sampled());
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }

        let trace_id = TraceId::from_hex(parts[1])?;
        if trace_id.is_zero() {
            return None;
        }
        let parent_span_id = SpanId::from_hex(parts[2])?;
        if parent_span_id.as_bytes().iter().all(|b| *b == 0) {
            return None;
        }

        let flags = parts[3];
        if flags.len() != 2 {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id,
            parent_span_id: Some(parent_span_id),
            flags: TraceFlags(flags),
        })
    }
}

/// W3C `traceparent` trace flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0x00);
    /// The trace is sampled.
    pub const SAMPLED: Self = Self(0x01);

    /// Returns true if the sampled flag is set.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & 0x01 != 0
    }
}
