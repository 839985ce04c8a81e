//! Configuration schema types.
//!
//! Every section rejects unknown fields and falls back to its defaults for
//! fields that are absent.

use hestia_server::{
    DEFAULT_HTTP_ADDR, DEFAULT_READ_HEADER_TIMEOUT_SECS, DEFAULT_SERVICE_NAME,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use hestia_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

/// Server section.
///
/// # Example
///
/// ```
/// use hestia_config::ServerSection;
///
/// let server = ServerSection {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert!(server.keep_alive);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Time allowed to read request headers, in seconds. `None` disables the
    /// limit.
    #[serde(default = "default_read_header_timeout")]
    pub read_header_timeout_secs: Option<u64>,

    /// Whether HTTP/1.1 keep-alive is enabled.
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Service name used in trace context and logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            read_header_timeout_secs: default_read_header_timeout(),
            keep_alive: true,
            service_name: default_service_name(),
        }
    }
}

/// Shutdown section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSection {
    /// Deadline for all shutdown listeners, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Request log section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestLogSection {
    /// Whether every exchange is logged.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Header names whose values are replaced in log entries. Empty selects
    /// `Authorization` and `Cookie`.
    #[serde(default)]
    pub redacted_headers: Vec<String>,
}

impl Default for RequestLogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            redacted_headers: Vec::new(),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether the log subscriber is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (e.g., "info" or "hestia_server=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `json`, `pretty` or `compact`.
    #[serde(default)]
    pub format: LogFormat,

    /// Whether span open/close events are logged.
    #[serde(default)]
    pub span_events: bool,

    /// Whether file and line are included.
    #[serde(default)]
    pub include_location: bool,

    /// Whether thread ids are included.
    #[serde(default)]
    pub thread_ids: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            span_events: false,
            include_location: false,
            thread_ids: false,
        }
    }
}

fn default_http_addr() -> String {
    DEFAULT_HTTP_ADDR.to_string()
}

fn default_read_header_timeout() -> Option<u64> {
    Some(DEFAULT_READ_HEADER_TIMEOUT_SECS)
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}
