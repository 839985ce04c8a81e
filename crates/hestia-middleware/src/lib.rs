//! # Hestia Middleware
//!
//! Middleware for the Hestia server runtime.
//!
//! This crate provides the stages the server wraps around every application
//! handler, and the response instrumentation they are built on.
//!
//! ## Chain
//!
//! ```text
//! Request → Recovery → RequestLog → WriteError → Tracing → Handler
//!                                                             ↓
//! Response ← Recovery ← RequestLog ← WriteError ← Tracing ←───┘
//! ```
//!
//! | Stage       | Middleware               | Purpose                                   |
//! |-------------|--------------------------|-------------------------------------------|
//! | recovery    | [`RecoveryMiddleware`]   | Turn handler panics into a fault response |
//! | request_log | [`RequestLogMiddleware`] | One structured log entry per exchange     |
//! | write_error | [`WriteErrorMiddleware`] | Report failed response body writes        |
//! | tracing     | [`TracingMiddleware`]    | W3C trace context and span ids            |
//!
//! ## Example
//!
//! ```
//! use hestia_core::not_found;
//! use hestia_middleware::{
//!     Pipeline, RecoveryMiddleware, RequestLogMiddleware, TracingMiddleware,
//!     TracingRequestLogger, WriteErrorMiddleware,
//! };
//!
//! let pipeline = Pipeline::builder()
//!     .stage(RecoveryMiddleware::new())
//!     .stage(RequestLogMiddleware::new(TracingRequestLogger::new()))
//!     .stage(WriteErrorMiddleware::new())
//!     .stage(TracingMiddleware::new("orders"))
//!     .build(not_found());
//!
//! assert_eq!(
//!     pipeline.stage_names(),
//!     vec!["recovery", "request_log", "write_error", "tracing"]
//! );
//! ```

#![doc(html_root_url = "https://docs.rs/hestia-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod counting;
mod error;
pub mod instrumented;
pub mod middleware;
pub mod pipeline;
pub mod request_logger;
pub mod stages;

// Re-export main types at crate root
pub use counting::{BodyStats, CountingBody};
pub use error::WriteError;
pub use instrumented::InstrumentedResponse;
pub use middleware::{middleware_fn, FnMiddleware, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use request_logger::{
    ip_from_host_port, Entry, HttpRecord, RedactedHeaders, RequestLogger, RequestMeta,
    ResponseMeasurements, TracingRequestLogger, DEFAULT_REDACTED_HEADERS, REDACTED,
};
pub use stages::{
    DefaultFaultHandler, OnWriteError, RecoveryMiddleware, RequestLogMiddleware,
    TracingMiddleware, WriteErrorMiddleware,
};
