//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The named file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// The path that was read.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or TOML with unknown fields.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Malformed JSON, or JSON with unknown fields.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A `.env` file could not be loaded.
    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A field holds a value outside its allowed range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `server.http_addr`.
        field: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// An override variable could not be parsed.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The variable name.
        var: String,
        /// The expected shape of the value.
        reason: String,
    },

    /// Any other rejected input, such as an unsupported file format.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}
