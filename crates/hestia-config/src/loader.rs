//! Layered configuration loader.
//!
//! Layers apply in order, later ones overriding earlier ones:
//!
//! 1. Defaults, or a development/production preset
//! 2. A TOML or JSON file
//! 3. A `.env` file, loaded into the process environment
//! 4. Environment variables named `PREFIX__SECTION__KEY`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hestia_telemetry::LogFormat;

use crate::{ConfigError, HestiaConfig};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "HESTIA";

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use hestia_config::ConfigLoader;
///
/// # fn main() -> Result<(), hestia_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("hestia.toml")?
///     .with_dotenv()?
///     .with_env_prefix("HESTIA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HestiaConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HestiaConfig::default(),
            env_prefix: None,
        }
    }

    /// Starts from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HestiaConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HestiaConfig::production();
        self
    }

    /// Loads a configuration file, choosing the format by extension
    /// (`.toml` or `.json`).
    ///
    /// The file replaces the current layer; sections and fields it omits
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, has an unknown
    /// extension or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = parse_file(&content, path)?;
        Ok(self)
    }

    /// Like [`ConfigLoader::with_file`], but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `format` (`toml` or `json`).
    ///
    /// # Example
    ///
    /// ```
    /// use hestia_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[shutdown]\ntimeout_secs = 5", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.shutdown.timeout_secs, 5);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Loads `.env` from the current directory or its parents into the
    /// process environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "Loaded .env file");
                Ok(self)
            }
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads a specific `.env` file into the process environment.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        dotenvy::from_path(&path)?;
        tracing::debug!(path = %path.display(), "Loaded .env file");
        Ok(self)
    }

    /// Enables overrides from environment variables named
    /// `PREFIX__SECTION__KEY`, e.g. `HESTIA__SERVER__HTTP_ADDR`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides from the process environment and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Fails if an override cannot be parsed or validation fails.
    pub fn load(self) -> Result<HestiaConfig, ConfigError> {
        self.load_with_env(env::vars())
    }

    /// Like [`ConfigLoader::load`], reading overrides from `vars` instead of
    /// the process environment.
    ///
    /// # Example
    ///
    /// ```
    /// use hestia_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_env_prefix("HESTIA")
    ///     .load_with_env([("HESTIA__SERVER__KEEP_ALIVE".to_string(), "false".to_string())])
    ///     .unwrap();
    ///
    /// assert!(!config.server.keep_alive);
    /// ```
    pub fn load_with_env<I>(mut self, vars: I) -> Result<HestiaConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(prefix) = self.env_prefix.take() {
            let marker = format!("{prefix}__");
            for (key, value) in vars {
                if let Some(path) = key.strip_prefix(&marker) {
                    apply_env_var(&mut self.config, &key, path, &value)?;
                }
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HestiaConfig {
        self.config
    }
}

fn parse_file(content: &str, path: &Path) -> Result<HestiaConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("toml") => Ok(toml::from_str(content)?),
        Some("json") => Ok(serde_json::from_str(content)?),
        _ => Err(ConfigError::validation_error(format!(
            "unsupported configuration file format: {}",
            path.display()
        ))),
    }
}

fn apply_env_var(
    config: &mut HestiaConfig,
    key: &str,
    path: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let parts: Vec<&str> = path.split("__").collect();

    match parts.as_slice() {
        ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
        ["SERVER", "READ_HEADER_TIMEOUT_SECS"] => {
            config.server.read_header_timeout_secs = if value.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_u64(key, value, "expected integer or 'none'")?)
            };
        }
        ["SERVER", "KEEP_ALIVE"] => config.server.keep_alive = parse_bool_var(key, value)?,
        ["SERVER", "SERVICE_NAME"] => config.server.service_name = value.to_string(),

        ["SHUTDOWN", "TIMEOUT_SECS"] => {
            config.shutdown.timeout_secs = parse_u64(key, value, "expected integer")?;
        }

        ["REQUEST_LOG", "ENABLED"] => config.request_log.enabled = parse_bool_var(key, value)?,
        ["REQUEST_LOG", "REDACTED_HEADERS"] => {
            config.request_log.redacted_headers = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool_var(key, value)?,
        ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
        ["LOGGING", "FORMAT"] => {
            config.logging.format = value
                .parse::<LogFormat>()
                .map_err(|_| ConfigError::env_parse_error(key, "expected 'json', 'pretty' or 'compact'"))?;
        }
        ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = parse_bool_var(key, value)?,
        ["LOGGING", "INCLUDE_LOCATION"] => {
            config.logging.include_location = parse_bool_var(key, value)?;
        }
        ["LOGGING", "THREAD_IDS"] => config.logging.thread_ids = parse_bool_var(key, value)?,

        _ => tracing::debug!(var = key, "Ignoring unknown configuration variable"),
    }

    Ok(())
}

fn parse_u64(key: &str, value: &str, reason: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, reason))
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load_with_env(Vec::new()).unwrap();
        assert_eq!(config, HestiaConfig::default());
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"server": {"http_addr": "127.0.0.1:3000"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load_with_env(Vec::new())
            .unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert_eq!(config.shutdown.timeout_secs, 30);
    }

    #[test]
    fn test_loader_unsupported_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert!(err.to_string().contains("unsupported configuration format: yaml"));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/hestia.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        assert!(ConfigLoader::new()
            .with_optional_file("/nonexistent/hestia.toml")
            .is_ok());
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "127.0.0.1:8081"
            service_name = "billing"

            [request_log]
            redacted_headers = ["X-Api-Key"]

            [logging]
            format = "compact"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load_with_env(Vec::new())
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:8081");
        assert_eq!(config.server.service_name, "billing");
        assert_eq!(config.request_log.redacted_headers, ["X-Api-Key"]);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 8080").unwrap();

        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_loader_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::new()
            .with_env_prefix("hestia")
            .load_with_env(vars(&[
                ("HESTIA__SERVER__HTTP_ADDR", "127.0.0.1:9000"),
                ("HESTIA__SERVER__READ_HEADER_TIMEOUT_SECS", "none"),
                ("HESTIA__SHUTDOWN__TIMEOUT_SECS", "5"),
                ("HESTIA__REQUEST_LOG__ENABLED", "off"),
                ("HESTIA__REQUEST_LOG__REDACTED_HEADERS", "X-Api-Key, X-Token"),
                ("HESTIA__LOGGING__FORMAT", "pretty"),
                ("OTHER__SERVER__HTTP_ADDR", "ignored"),
            ]))
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(config.server.read_header_timeout_secs, None);
        assert_eq!(config.shutdown.timeout_secs, 5);
        assert!(!config.request_log.enabled);
        assert_eq!(config.request_log.redacted_headers, ["X-Api-Key", "X-Token"]);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides_need_prefix() {
        let config = ConfigLoader::new()
            .load_with_env(vars(&[("HESTIA__SHUTDOWN__TIMEOUT_SECS", "5")]))
            .unwrap();
        assert_eq!(config.shutdown.timeout_secs, 30);
    }

    #[test]
    fn test_env_invalid_integer() {
        let err = ConfigLoader::new()
            .with_env_prefix("HESTIA")
            .load_with_env(vars(&[("HESTIA__SHUTDOWN__TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_env_invalid_boolean() {
        let err = ConfigLoader::new()
            .with_env_prefix("HESTIA")
            .load_with_env(vars(&[("HESTIA__SERVER__KEEP_ALIVE", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_env_override_is_validated() {
        let err = ConfigLoader::new()
            .with_env_prefix("HESTIA")
            .load_with_env(vars(&[("HESTIA__SHUTDOWN__TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HESTIA_TEST_DOTENV_MARKER=loaded").unwrap();

        ConfigLoader::new().with_dotenv_file(file.path()).unwrap();

        assert_eq!(env::var("HESTIA_TEST_DOTENV_MARKER").unwrap(), "loaded");
    }

    #[test]
    fn test_dotenv_file_missing() {
        let err = ConfigLoader::new()
            .with_dotenv_file("/nonexistent/.env")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Dotenv(_)));
    }

    #[test]
    fn test_presets() {
        let dev = ConfigLoader::new().with_development().load_unvalidated();
        assert_eq!(dev.logging.format, LogFormat::Pretty);

        let prod = ConfigLoader::new().with_production().load_unvalidated();
        assert_eq!(prod.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
