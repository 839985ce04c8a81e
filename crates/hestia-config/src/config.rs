//! The root configuration type and its conversions.

use crate::schema::{LoggingSection, RequestLogSection, ServerSection, ShutdownSection};
use crate::ConfigError;
use hestia_server::{is_listen_addr, ServerConfig};
use hestia_telemetry::{create_env_filter, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete Hestia configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use hestia_config::HestiaConfig;
///
/// let config = HestiaConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HestiaConfig {
    /// Server section.
    #[serde(default)]
    pub server: ServerSection,

    /// Shutdown section.
    #[serde(default)]
    pub shutdown: ShutdownSection,

    /// Request log section.
    #[serde(default)]
    pub request_log: RequestLogSection,

    /// Logging section.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HestiaConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the listen address is not
    /// listenable (see [`is_listen_addr`]), the shutdown timeout is zero, or
    /// the log level is not a valid filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_listen_addr(&self.server.http_addr) {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid listen address: {}", self.server.http_addr),
            ));
        }

        if self.shutdown.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "shutdown.timeout_secs",
                "must be greater than zero",
            ));
        }

        if self.server.read_header_timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "server.read_header_timeout_secs",
                "must be greater than zero, omit it to disable the limit",
            ));
        }

        if self.logging.enabled {
            create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Creates a development preset: debug level, pretty output with source
    /// locations.
    ///
    /// # Example
    ///
    /// ```
    /// use hestia_config::HestiaConfig;
    ///
    /// let config = HestiaConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config.logging.span_events = true;
        config
    }

    /// Creates a production preset: info level, JSON output.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config
    }

    /// Returns the shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown.timeout_secs)
    }

    /// Builds the server configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .http_addr(self.server.http_addr.clone())
            .read_header_timeout(self.server.read_header_timeout_secs.map(Duration::from_secs))
            .keep_alive(self.server.keep_alive)
            .shutdown_timeout(self.shutdown_timeout())
            .request_logging(self.request_log.enabled)
            .redacted_headers(&self.request_log.redacted_headers)
            .service_name(self.server.service_name.clone())
            .build()
    }

    /// Builds the logging configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            span_events: self.logging.span_events,
            file_line_info: self.logging.include_location,
            thread_ids: self.logging.thread_ids,
            include_target: true,
            service_name: self.server.service_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HestiaConfig::default().validate().is_ok());
        assert!(HestiaConfig::development().validate().is_ok());
        assert!(HestiaConfig::production().validate().is_ok());
    }

    #[test]
    fn test_invalid_addr() {
        let mut config = HestiaConfig::default();
        config.server.http_addr = "localhost".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_port_only_and_host_name_addrs_are_valid() {
        let mut config = HestiaConfig::default();
        config.server.http_addr = ":8080".to_string();
        assert!(config.validate().is_ok());

        config.server.http_addr = "localhost:8080".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_shutdown_timeout() {
        let mut config = HestiaConfig::default();
        config.shutdown.timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shutdown.timeout_secs"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HestiaConfig::default();
        config.logging.level = "hestia=loud".to_string();
        assert!(config.validate().is_err());

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_conversion() {
        let mut config = HestiaConfig::default();
        config.server.http_addr = "127.0.0.1:9000".to_string();
        config.server.read_header_timeout_secs = None;
        config.shutdown.timeout_secs = 5;
        config.request_log.enabled = false;
        config.request_log.redacted_headers = vec!["X-Api-Key".to_string()];

        let server = config.server_config();

        assert_eq!(server.http_addr(), "127.0.0.1:9000");
        assert_eq!(server.read_header_timeout(), None);
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(5));
        assert!(!server.request_logging());
        assert_eq!(server.redacted_headers(), ["X-Api-Key".to_string()]);
    }

    #[test]
    fn test_log_config_conversion() {
        let mut config = HestiaConfig::development();
        config.server.service_name = "orders".to_string();

        let log = config.log_config();

        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Pretty);
        assert!(log.file_line_info);
        assert_eq!(log.service_name, "orders");
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = HestiaConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: HestiaConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
