//! Typed configuration for Hestia services.
//!
//! - TOML and JSON configuration files
//! - `.env` files via `dotenvy`
//! - Environment variable overrides
//! - Strict parsing (unknown fields are errors) and validation
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! read_header_timeout_secs = 30
//! keep_alive = true
//! service_name = "orders"
//!
//! [shutdown]
//! timeout_secs = 30
//!
//! [request_log]
//! enabled = true
//! redacted_headers = ["Authorization", "Cookie", "X-Api-Key"]
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with variables named `PREFIX__SECTION__KEY`:
//!
//! - `HESTIA__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `HESTIA__SHUTDOWN__TIMEOUT_SECS=10`
//! - `HESTIA__REQUEST_LOG__REDACTED_HEADERS=Authorization,X-Api-Key`
//! - `HESTIA__LOGGING__FORMAT=pretty`
//!
//! # Example
//!
//! ```no_run
//! use hestia_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
//!
//! # fn main() -> Result<(), hestia_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("hestia.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix(DEFAULT_ENV_PREFIX)
//!     .load()?;
//!
//! let server_config = config.server_config();
//! println!("listening on {}", server_config.http_addr());
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hestia-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::HestiaConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LoggingSection, RequestLogSection, ServerSection, ShutdownSection};
