//! Logging setup for Hestia services.
//!
//! Every Hestia crate reports through `tracing` macros with structured
//! fields. This crate installs the subscriber that renders those events:
//! JSON lines in production, pretty output during development.
//!
//! # Example
//!
//! ```rust,no_run
//! use hestia_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig::development().with_format(LogFormat::Compact);
//! init_logging(&config).expect("logging is initialized once");
//! ```

#![doc(html_root_url = "https://docs.rs/hestia-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
