//! The server composition root.
//!
//! A [`Server`] wraps the application handler in the standard chain and
//! delegates socket work to a [`Driver`]. The chain is built once, on first
//! use, outermost first:
//!
//! 1. recovery
//! 2. request log (when enabled)
//! 3. write-error log
//! 4. tracing
//! 5. the application handler, or `404 page not found` when there is none
//!
//! `/healthz/liveness` and `/healthz/readiness` are answered beside the
//! chain.
//!
//! # Example
//!
//! ```rust,no_run
//! use hestia_core::{handler_fn, ResponseWriter};
//! use hestia_server::Server;
//!
//! # async fn run() -> Result<(), hestia_server::ServerError> {
//! let server = Server::new(handler_fn(|_ctx, _req, res| {
//!     Box::pin(async move {
//!         let _ = res.write_all(b"Hello");
//!     })
//! }));
//!
//! server.listen_and_serve("0.0.0.0:8080").await
//! # }
//! ```

use crate::config::{normalize_addr, ServerConfig};
use crate::driver::{Driver, HyperDriver};
use crate::error::{ServerError, ServerResult};
use crate::health::{HealthChecks, Liveness, Readiness, LIVENESS_PATH, READINESS_PATH};
use crate::shutdown::{ShutdownContext, ShutdownListener};
use hestia_core::{BoxError, BoxFuture, Handler, NotFound, Request, RequestContext, ResponseWriter};
use hestia_middleware::{
    OnWriteError, Pipeline, RecoveryMiddleware, RequestLogMiddleware, RequestLogger,
    TracingMiddleware, TracingRequestLogger, WriteErrorMiddleware,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A preconfigured HTTP server.
pub struct Server {
    config: ServerConfig,
    driver: OnceLock<Arc<dyn Driver>>,
    root: Arc<RootHandler>,
}

impl Server {
    /// Creates a server with the default configuration serving `handler`.
    #[must_use]
    pub fn new<H: Handler>(handler: H) -> Self {
        Self::builder().handler(handler).build()
    }

    /// Creates a new server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the driver, once one is selected.
    ///
    /// A driver passed to the builder is selected immediately; otherwise the
    /// default [`HyperDriver`] is created on the first call to a serve method.
    #[must_use]
    pub fn driver(&self) -> Option<&Arc<dyn Driver>> {
        self.driver.get()
    }

    /// Returns the root handler: health endpoints plus the handler chain.
    ///
    /// Drivers call this handler for every exchange.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.root) as Arc<dyn Handler>
    }

    /// Serves on the configured [`ServerConfig::http_addr`].
    pub async fn serve(&self) -> ServerResult<()> {
        let addr = self.config.http_addr().to_string();
        self.listen_and_serve(&addr).await
    }

    /// Listens on `addr` and serves until the server is shut down.
    pub async fn listen_and_serve(&self, addr: &str) -> ServerResult<()> {
        let addr = resolve_addr(addr).await?;
        let driver = self.driver_or_default();
        tracing::debug!(addr = %addr, driver = driver.name(), "Listen and serve");
        driver.listen_and_serve(addr, self.handler()).await
    }

    /// Like [`Server::listen_and_serve`], over TLS.
    ///
    /// Fails with [`ServerError::UnsupportedCapability`] when the driver has
    /// no TLS support.
    pub async fn listen_and_serve_tls(
        &self,
        addr: &str,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> ServerResult<()> {
        let driver = self.driver_or_default();
        let Some(tls) = driver.tls() else {
            return Err(ServerError::UnsupportedCapability {
                driver: driver.name(),
                capability: "TLS",
            });
        };
        let addr = resolve_addr(addr).await?;
        tracing::debug!(addr = %addr, driver = driver.name(), "Listen and serve TLS");
        tls.listen_and_serve_tls(addr, cert_file.into(), key_file.into(), self.handler())
            .await
    }

    /// Gracefully shuts the server down without interrupting active
    /// exchanges. Succeeds immediately if no driver was ever selected.
    pub async fn shutdown(&self, ctx: ShutdownContext) -> ServerResult<()> {
        match self.driver.get() {
            Some(driver) => driver.shutdown(ctx).await,
            None => Ok(()),
        }
    }

    fn driver_or_default(&self) -> &Arc<dyn Driver> {
        self.driver
            .get_or_init(|| Arc::new(HyperDriver::from_config(&self.config)))
    }
}

impl ShutdownListener for Server {
    fn on_shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move { self.shutdown(ctx).await.map_err(Into::into) })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("driver", &self.driver.get().map(|d| d.name()))
            .finish_non_exhaustive()
    }
}

/// Accepts socket addresses, the `":port"` shorthand and `host:port`.
/// Host names resolve to their first address.
async fn resolve_addr(addr: &str) -> ServerResult<SocketAddr> {
    let normalized = normalize_addr(addr);
    if let Ok(parsed) = normalized.parse() {
        return Ok(parsed);
    }
    let resolved = tokio::net::lookup_host(&*normalized)
        .await
        .map_err(|e| ServerError::Bind(format!("invalid address '{addr}': {e}")))?
        .next()
        .ok_or_else(|| ServerError::Bind(format!("invalid address '{addr}': no address resolved")));
    resolved
}

/// Routes health probes and hands everything else to the lazily built chain.
struct RootHandler {
    app: Arc<dyn Handler>,
    config: ServerConfig,
    request_logger: Option<Arc<dyn RequestLogger>>,
    fault_handler: Option<Arc<dyn Handler>>,
    on_write_error: Option<OnWriteError>,
    liveness: Liveness,
    readiness: Readiness,
    chain: OnceLock<Pipeline>,
    chain_builds: AtomicUsize,
}

impl RootHandler {
    fn chain(&self) -> &Pipeline {
        self.chain.get_or_init(|| {
            self.chain_builds.fetch_add(1, Ordering::SeqCst);
            let pipeline = self.build_chain();
            tracing::debug!(stages = ?pipeline.stage_names(), "Handler chain built");
            pipeline
        })
    }

    fn build_chain(&self) -> Pipeline {
        let recovery = match &self.fault_handler {
            Some(handler) => RecoveryMiddleware::with_shared_fault_handler(Arc::clone(handler)),
            None => RecoveryMiddleware::new(),
        };
        let request_log = self.config.request_logging().then(|| {
            let logger = self.request_logger.clone().unwrap_or_else(|| {
                Arc::new(TracingRequestLogger::with_redacted_headers(
                    self.config.redacted_headers(),
                ))
            });
            RequestLogMiddleware::with_shared_logger(logger)
        });
        let write_error = match &self.on_write_error {
            Some(callback) => {
                let callback = Arc::clone(callback);
                WriteErrorMiddleware::with_callback(move |err| callback(err))
            }
            None => WriteErrorMiddleware::new(),
        };

        Pipeline::builder()
            .stage(recovery)
            .optional_stage(request_log)
            .stage(write_error)
            .stage(TracingMiddleware::new(self.config.service_name()))
            .build_shared(Arc::clone(&self.app))
    }
}

impl Handler for RootHandler {
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        match request.uri().path() {
            LIVENESS_PATH => self.liveness.serve(ctx, request, response),
            READINESS_PATH => self.readiness.serve(ctx, request, response),
            _ => self.chain().serve(ctx, request, response),
        }
    }
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    handler: Option<Arc<dyn Handler>>,
    driver: Option<Arc<dyn Driver>>,
    request_logger: Option<Arc<dyn RequestLogger>>,
    fault_handler: Option<Arc<dyn Handler>>,
    on_write_error: Option<OnWriteError>,
    health_checks: HealthChecks,
}

impl ServerBuilder {
    /// Creates a new server builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the application handler.
    #[must_use]
    pub fn handler<H: Handler>(self, handler: H) -> Self {
        self.shared_handler(Arc::new(handler))
    }

    /// Sets an already shared application handler.
    #[must_use]
    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the driver. Without one, a [`HyperDriver`] is used.
    #[must_use]
    pub fn driver<D: Driver>(self, driver: D) -> Self {
        self.shared_driver(Arc::new(driver))
    }

    /// Sets an already shared driver.
    #[must_use]
    pub fn shared_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Sets the request log sink. Without one, entries go to
    /// [`TracingRequestLogger`].
    #[must_use]
    pub fn request_logger<L: RequestLogger>(mut self, logger: L) -> Self {
        self.request_logger = Some(Arc::new(logger));
        self
    }

    /// Sets the handler that answers recovered faults.
    #[must_use]
    pub fn fault_handler<H: Handler>(mut self, handler: H) -> Self {
        self.fault_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the callback invoked when writing a response body fails.
    #[must_use]
    pub fn on_write_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&hestia_middleware::WriteError) + Send + Sync + 'static,
    {
        self.on_write_error = Some(Arc::new(callback));
        self
    }

    /// Adds a readiness check.
    #[must_use]
    pub fn health_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.health_checks = self.health_checks.add_check(name, check);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        let config = self.config.unwrap_or_default();
        let driver = OnceLock::new();
        if let Some(configured) = self.driver {
            let _ = driver.set(configured);
        }
        let root = RootHandler {
            app: self.handler.unwrap_or_else(|| Arc::new(NotFound)),
            config: config.clone(),
            request_logger: self.request_logger,
            fault_handler: self.fault_handler,
            on_write_error: self.on_write_error,
            liveness: Liveness,
            readiness: Readiness::new(self.health_checks),
            chain: OnceLock::new(),
            chain_builds: AtomicUsize::new(0),
        };
        Server {
            config,
            driver,
            root: Arc::new(root),
        }
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("health_checks", &self.health_checks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::fixtures::{request, RecordingWriter};
    use hestia_core::handler_fn;
    use hestia_middleware::Entry;
    use http::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;

    type Captured = Arc<Mutex<Vec<Entry>>>;

    fn capturing(builder: ServerBuilder) -> (Server, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let server = builder
            .request_logger(move |entry: &Entry| sink.lock().unwrap().push(entry.clone()))
            .build();
        (server, captured)
    }

    async fn call(server: &Server, path: &str) -> RecordingWriter {
        let mut ctx = RequestContext::new();
        let mut req = request("GET", path);
        let mut writer = RecordingWriter::new();
        server.handler().serve(&mut ctx, &mut req, &mut writer).await;
        writer
    }

    #[test]
    fn test_chain_order() {
        let server = Server::builder().build();
        assert_eq!(
            server.root.chain().stage_names(),
            ["recovery", "request_log", "write_error", "tracing"]
        );

        let quiet = Server::builder()
            .config(ServerConfig::builder().request_logging(false).build())
            .build();
        assert_eq!(
            quiet.root.chain().stage_names(),
            ["recovery", "write_error", "tracing"]
        );
    }

    #[tokio::test]
    async fn test_default_handler_is_not_found() {
        let (server, captured) = capturing(Server::builder());

        let writer = call(&server, "/missing").await;

        assert_eq!(writer.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(writer.body(), b"404 page not found\n");
        assert_eq!(captured.lock().unwrap()[0].status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_routes_bypass_request_log() {
        let (server, captured) = capturing(Server::builder().health_check("db", || false));

        let live = call(&server, LIVENESS_PATH).await;
        let ready = call(&server, READINESS_PATH).await;

        assert_eq!(live.status(), Some(StatusCode::OK));
        assert_eq!(ready.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_gets_500() {
        let server = Server::new(handler_fn(|_ctx, _req, _res| {
            Box::pin(async { panic!("boom") })
        }));

        let writer = call(&server, "/").await;

        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(writer.body().is_empty());
    }

    #[tokio::test]
    async fn test_custom_fault_handler() {
        let server = Server::builder()
            .handler(handler_fn(|_ctx, _req, _res| {
                Box::pin(async { panic!("boom") })
            }))
            .fault_handler(handler_fn(|_ctx, _req, res| {
                Box::pin(async move {
                    res.write_header(StatusCode::BAD_GATEWAY);
                })
            }))
            .build();

        let writer = call(&server, "/").await;

        assert_eq!(writer.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_build_one_chain() {
        let server = Arc::new(Server::new(handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.write_header(StatusCode::NO_CONTENT);
            })
        })));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let server = Arc::clone(&server);
                tokio::spawn(async move { call(&server, "/").await.status() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Some(StatusCode::NO_CONTENT));
        }

        assert_eq!(server.root.chain_builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tls_unsupported_by_default_driver() {
        let server = Server::builder().build();

        let err = server
            .listen_and_serve_tls("127.0.0.1:0", "cert.pem", "key.pem")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServerError::UnsupportedCapability {
                driver: "hyper",
                capability: "TLS"
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_without_driver_is_noop() {
        let server = Server::builder().build();
        assert!(server.driver().is_none());

        let result = server
            .shutdown(ShutdownContext::with_timeout(Duration::from_millis(10)))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let server = Server::builder().build();

        let err = server.listen_and_serve("not-an-address").await.unwrap_err();

        assert!(err.to_string().contains("invalid address 'not-an-address'"));
    }

    #[tokio::test]
    async fn test_port_only_address_listens_on_all_interfaces() {
        let driver = Arc::new(HyperDriver::new());
        let server = Arc::new(Server::builder().shared_driver(driver.clone()).build());

        let serving = Arc::clone(&server);
        let serve = tokio::spawn(async move { serving.listen_and_serve(":0").await });
        let addr = driver.bound_addr().await.unwrap();

        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
        server
            .shutdown(ShutdownContext::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        serve.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_host_name_is_resolved() {
        let addr = resolve_addr("localhost:8080").await.unwrap();

        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_request_logged() {
        let (server, captured) = capturing(Server::builder().handler(handler_fn(
            |_ctx, _req, _res| Box::pin(async { panic!("boom") }),
        )));

        let writer = call(&server, "/orders").await;

        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let entries = captured.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_write_error_callback() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let server = Server::builder()
            .handler(handler_fn(|_ctx, _req, res| {
                Box::pin(async move {
                    let _ = res.write(b"lost");
                })
            }))
            .on_write_error(move |err| sink.lock().unwrap().push(err.kind()))
            .build();

        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        let mut writer = RecordingWriter::new().fail_writes(std::io::ErrorKind::ConnectionReset);
        server.handler().serve(&mut ctx, &mut req, &mut writer).await;

        assert_eq!(
            *reported.lock().unwrap(),
            [std::io::ErrorKind::ConnectionReset]
        );
    }
}
