//! # Hestia Server
//!
//! HTTP server and graceful shutdown for the Hestia runtime.
//!
//! This crate provides:
//!
//! - [`Server`], which wraps an application handler in the standard
//!   middleware chain and serves it through a pluggable [`Driver`]
//! - [`HyperDriver`], the default HTTP/1.1 driver built on hyper
//! - Health endpoints at `/healthz/liveness` and `/healthz/readiness`
//! - [`Shutdown`], which waits for a termination signal and stops every
//!   registered [`ShutdownListener`] under one deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use hestia_core::{handler_fn, ResponseWriter};
//! use hestia_server::shutdown::Shutdown;
//! use hestia_server::{HyperDriver, Server, ServerConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();
//!     let server = Arc::new(
//!         Server::builder()
//!             .config(config)
//!             .handler(handler_fn(|_ctx, _req, res| {
//!                 Box::pin(async move {
//!                     let _ = res.write_all(b"Hello");
//!                 })
//!             }))
//!             .build(),
//!     );
//!
//!     let serving = Arc::clone(&server);
//!     tokio::spawn(async move { serving.serve().await });
//!
//!     let mut shutdown = Shutdown::builder(Duration::from_secs(30))
//!         .listener("http", server)
//!         .build();
//!     if shutdown.wait().await.result().is_err() {
//!         std::process::exit(1);
//!     }
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hestia-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod channel;
mod config;
pub mod connection;
mod driver;
mod error;
mod health;
mod server;
pub mod shutdown;
pub mod signal;

pub use config::{
    is_listen_addr, normalize_addr, ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_READ_HEADER_TIMEOUT_SECS,
    DEFAULT_SERVICE_NAME, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use driver::{Driver, HyperDriver, TlsDriver};
pub use error::{ServerError, ServerResult, ShutdownError};
pub use health::{HealthChecks, Liveness, Readiness, HEALTH_PREFIX, LIVENESS_PATH, READINESS_PATH};
pub use server::{Server, ServerBuilder};
pub use shutdown::{
    listener_fn, ListenerReport, Shutdown, ShutdownBuilder, ShutdownContext, ShutdownListener,
    ShutdownOutcome,
};
pub use signal::{Signal, SignalSource};
