//! Server configuration types.
//!
//! This module provides configuration types for the Hestia server,
//! using the builder pattern for ergonomic construction.
//!
//! # Example
//!
//! ```rust
//! use hestia_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("0.0.0.0:8080")
//!     .shutdown_timeout(Duration::from_secs(30))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "0.0.0.0:8080");
//! ```

use hestia_middleware::DEFAULT_REDACTED_HEADERS;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default timeout for reading request headers, in seconds.
pub const DEFAULT_READ_HEADER_TIMEOUT_SECS: u64 = 30;

/// Default service name recorded on request spans.
pub const DEFAULT_SERVICE_NAME: &str = "hestia";

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080")
    http_addr: String,

    /// How long a client may take to send the request headers
    read_header_timeout: Option<Duration>,

    /// Whether idle connections are kept open between requests
    keep_alive: bool,

    /// Timeout for graceful shutdown
    shutdown_timeout: Duration,

    /// Whether the request log stage is part of the chain
    request_logging: bool,

    /// Header names masked in request log entries
    redacted_headers: Vec<String>,

    /// Service name recorded on request spans
    service_name: String,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the HTTP bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses and returns the HTTP address as a `SocketAddr`.
    ///
    /// A bare `":port"` means every interface. Host names are not resolved
    /// here; the server resolves them when it starts listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        normalize_addr(&self.http_addr).parse()
    }

    /// Returns the request header read timeout, if any.
    #[must_use]
    pub fn read_header_timeout(&self) -> Option<Duration> {
        self.read_header_timeout
    }

    /// Returns whether connection keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns whether request logging is enabled.
    #[must_use]
    pub fn request_logging(&self) -> bool {
        self.request_logging
    }

    /// Returns the header names redacted in request logs.
    #[must_use]
    pub fn redacted_headers(&self) -> &[String] {
        &self.redacted_headers
    }

    /// Returns the service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    read_header_timeout: Option<Duration>,
    keep_alive: bool,
    shutdown_timeout: Duration,
    request_logging: bool,
    redacted_headers: Vec<String>,
    service_name: String,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            read_header_timeout: Some(Duration::from_secs(DEFAULT_READ_HEADER_TIMEOUT_SECS)),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            request_logging: true,
            redacted_headers: DEFAULT_REDACTED_HEADERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }

    /// Sets the HTTP bind address.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hestia_server::ServerConfigBuilder;
    ///
    /// let config = ServerConfigBuilder::new().http_addr("127.0.0.1:9090").build();
    /// assert_eq!(config.socket_addr().unwrap().port(), 9090);
    /// ```
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the request header read timeout. `None` disables it.
    #[must_use]
    pub fn read_header_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_header_timeout = timeout;
        self
    }

    /// Enables or disables connection keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Sets the graceful shutdown timeout.
    ///
    /// This is the deadline the orchestrator gives every shutdown listener.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables the request log stage.
    #[must_use]
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Sets the header names redacted in request logs.
    ///
    /// An empty list keeps the defaults (`Authorization`, `Cookie`).
    #[must_use]
    pub fn redacted_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if !names.is_empty() {
            self.redacted_headers = names;
        }
        self
    }

    /// Sets the service name recorded on request spans.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Builds the [`ServerConfig`] with the configured values.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            read_header_timeout: self.read_header_timeout,
            keep_alive: self.keep_alive,
            shutdown_timeout: self.shutdown_timeout,
            request_logging: self.request_logging,
            redacted_headers: self.redacted_headers,
            service_name: self.service_name,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands the `":port"` shorthand to `0.0.0.0:port`.
#[must_use]
pub fn normalize_addr(addr: &str) -> Cow<'_, str> {
    if addr.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{addr}"))
    } else {
        Cow::Borrowed(addr)
    }
}

/// Returns `true` if `addr` can be listened on: a socket address, the
/// `":port"` shorthand, or `host:port` with a host name to resolve.
#[must_use]
pub fn is_listen_addr(addr: &str) -> bool {
    let addr = normalize_addr(addr);
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
