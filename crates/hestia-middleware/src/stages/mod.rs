//! Built-in middleware stages.
//!
//! The server composes these in a fixed order, outermost first:
//!
//! 1. [`recovery`] - Recover from handler panics
//! 2. [`request_log`] - Emit one log entry per exchange (optional)
//! 3. [`write_error`] - Report response write failures
//! 4. [`tracing`] - Assign trace and span ids

pub mod recovery;
pub mod request_log;
pub mod tracing;
pub mod write_error;

// Re-export main types
pub use self::tracing::{TraceContext, TraceFlags, TracingMiddleware, TRACEPARENT_HEADER};
pub use recovery::{DefaultFaultHandler, RecoveryMiddleware};
pub use request_log::RequestLogMiddleware;
pub use write_error::{OnWriteError, WriteErrorMiddleware};
