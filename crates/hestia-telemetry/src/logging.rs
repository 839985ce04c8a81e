//! Structured logging for Hestia services.
//!
//! Library crates only emit events through `tracing` macros. The process-wide
//! subscriber is installed once, by the binary, with [`init_logging`].
//!
//! # Example
//!
//! ```rust,no_run
//! use hestia_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production().with_service_name("orders"))?;
//!
//! tracing::info!(listener = "http", "Shutdown listener registered");
//! # Ok::<(), hestia_telemetry::TelemetryError>(())
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human-readable output.
    Pretty,
    /// Single-line, human-readable output.
    Compact,
}

impl LogFormat {
    /// Returns the lowercase name of the format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log format '{other}' (expected json, pretty or compact)"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directives, e.g. `info` or `hestia_server=debug,hyper=warn`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,

    /// Service name reported when logging starts.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
            service_name: "hestia".to_string(),
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            service_name: "hestia".to_string(),
        }
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Returns `true` for JSON output.
    #[must_use]
    pub fn json_format(&self) -> bool {
        self.format == LogFormat::Json
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the process-wide subscriber described by `config`.
///
/// Does nothing when logging is disabled.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if the filter directives are
/// invalid or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let base = tracing_subscriber::fmt::layer()
        .with_span_events(config.span_events())
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_thread_ids(config.thread_ids)
        .with_target(config.include_target);

    let layer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service.name = %config.service_name,
        format = %config.format,
        level = %config.level,
        "Logging initialized"
    );
    Ok(())
}

/// Parses filter directives.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if `filter` is not a valid
/// directive list.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level '{filter}': {e}")))
}

/// Field names shared by every Hestia crate.
pub mod fields {
    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field name.
    pub const SPAN_ID: &str = "span_id";

    /// Response status field name.
    pub const STATUS: &str = "status";

    /// Elapsed time field name (in milliseconds).
    pub const ELAPSED_MS: &str = "elapsed_ms";

    /// Serialized HTTP record field name.
    pub const HTTP: &str = "http";

    /// Error field name.
    pub const ERROR: &str = "error";

    /// Shutdown listener name field.
    pub const LISTENER: &str = "listener";

    /// Received signal field name.
    pub const SIGNAL: &str = "signal";

    /// Service name field name.
    pub const SERVICE_NAME: &str = "service.name";
}
