//! Transport drivers.
//!
//! A [`Driver`] owns the sockets: it accepts connections, speaks HTTP and
//! hands each exchange to the server's root handler. TLS is an optional
//! capability exposed through [`Driver::tls`].
//!
//! [`HyperDriver`] is the default: plain TCP, HTTP/1.1 via hyper, with a
//! graceful shutdown that stops accepting, lets in-flight exchanges finish
//! and waits for open connections until the shutdown deadline.

use crate::channel::{response_channel, ChannelBody};
use crate::config::ServerConfig;
use crate::connection::ConnectionTracker;
use crate::error::{ServerError, ServerResult};
use crate::shutdown::ShutdownContext;
use hestia_core::{body, BoxFuture, Handler, Request, RequestContext};
use http::{Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Serves HTTP on behalf of a [`Server`](crate::Server).
pub trait Driver: Send + Sync + 'static {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    /// Listens on `addr` and serves every exchange with `handler` until the
    /// driver is shut down.
    fn listen_and_serve(
        &self,
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
    ) -> BoxFuture<'_, ServerResult<()>>;

    /// Stops serving, waiting for in-flight work until `ctx`'s deadline.
    fn shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, ServerResult<()>>;

    /// Returns the TLS capability, if the driver has one.
    fn tls(&self) -> Option<&dyn TlsDriver> {
        None
    }
}

/// Optional TLS capability of a [`Driver`].
pub trait TlsDriver: Send + Sync {
    /// Like [`Driver::listen_and_serve`], terminating TLS with the given
    /// certificate and key files.
    fn listen_and_serve_tls(
        &self,
        addr: SocketAddr,
        cert_file: PathBuf,
        key_file: PathBuf,
        handler: Arc<dyn Handler>,
    ) -> BoxFuture<'_, ServerResult<()>>;
}

/// The default driver: HTTP/1.1 over TCP using hyper.
///
/// # Example
///
/// ```rust,no_run
/// use hestia_server::{HyperDriver, Server};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), hestia_server::ServerError> {
/// let driver = Arc::new(HyperDriver::new());
/// let server = Server::builder().shared_driver(driver.clone()).build();
///
/// tokio::spawn(async move { server.listen_and_serve("127.0.0.1:0").await });
/// let addr = driver.bound_addr().await;
/// println!("listening on {addr:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HyperDriver {
    read_header_timeout: Option<Duration>,
    keep_alive: bool,
    stop: CancellationToken,
    tracker: ConnectionTracker,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl HyperDriver {
    /// Creates a driver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&ServerConfig::default())
    }

    /// Creates a driver using the connection settings of `config`.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            read_header_timeout: config.read_header_timeout(),
            keep_alive: config.keep_alive(),
            stop: CancellationToken::new(),
            tracker: ConnectionTracker::new(),
            bound,
        }
    }

    /// Returns the address the driver is bound to, once it is listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Waits until the driver is listening and returns its address.
    pub async fn bound_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.bound.subscribe();
        let addr = rx.wait_for(Option::is_some).await.ok()?;
        *addr
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    fn http1(&self) -> http1::Builder {
        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new()).keep_alive(self.keep_alive);
        if let Some(timeout) = self.read_header_timeout {
            builder.header_read_timeout(timeout);
        }
        builder
    }
}

impl Default for HyperDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for HyperDriver {
    fn name(&self) -> &'static str {
        "hyper"
    }

    fn listen_and_serve(
        &self,
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
    ) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(async move {
            if self.stop.is_cancelled() {
                return Err(ServerError::Shutdown("server closed".to_string()));
            }

            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;
            let local_addr = listener.local_addr()?;
            self.bound.send_replace(Some(local_addr));
            tracing::info!(addr = %local_addr, "Server listening");

            let builder = self.http1();
            loop {
                tokio::select! {
                    () = self.stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote_addr)) => {
                            let guard = self.tracker.acquire();
                            let conn = serve_connection(
                                stream,
                                remote_addr,
                                local_addr,
                                Arc::clone(&handler),
                                builder.clone(),
                                self.stop.clone(),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = conn.await {
                                    tracing::debug!(
                                        remote_addr = %remote_addr,
                                        error = %e,
                                        "Connection error"
                                    );
                                }
                                drop(guard);
                            });
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                    },
                }
            }

            tracing::info!(addr = %local_addr, "Server stopped accepting connections");
            Ok(())
        })
    }

    fn shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(async move {
            self.stop.cancel();
            if self.local_addr().is_none() {
                return Ok(());
            }

            tokio::select! {
                () = self.tracker.wait_idle() => {
                    tracing::info!("All connections closed");
                    Ok(())
                }
                () = tokio::time::sleep_until(ctx.deadline()) => Err(self.still_active()),
                () = ctx.cancelled() => Err(self.still_active()),
            }
        })
    }
}

impl HyperDriver {
    fn still_active(&self) -> ServerError {
        ServerError::Shutdown(format!(
            "{} connections still active",
            self.tracker.active_connections()
        ))
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    builder: http1::Builder,
    stop: CancellationToken,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: http::Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move {
            Ok::<_, Infallible>(dispatch(handler, request, remote_addr, local_addr).await)
        }
    });

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => return result,
        () = stop.cancelled() => conn.as_mut().graceful_shutdown(),
    }
    conn.await
}

/// Runs one exchange in its own task and answers with whatever it writes.
async fn dispatch(
    handler: Arc<dyn Handler>,
    request: http::Request<Incoming>,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
) -> Response<ChannelBody> {
    let (parts, incoming) = request.into_parts();
    let mut request = Request::from_parts(parts, body::boxed(incoming));
    let (mut writer, head, body) = response_channel();

    tokio::spawn(async move {
        let mut ctx = RequestContext::with_addrs(remote_addr, local_addr);
        handler.serve(&mut ctx, &mut request, &mut writer).await;
        writer.finish().await;
    });

    match head.await {
        Ok((status, headers)) => {
            let mut response = Response::new(body);
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(_) => {
            tracing::error!("Handler task ended without a response");
            let mut response = Response::new(ChannelBody::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::handler_fn;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_before_serve_is_noop() {
        let driver = HyperDriver::new();
        let result = driver
            .shutdown(ShutdownContext::with_timeout(Duration::from_millis(10)))
            .await;
        assert!(result.is_ok());

        let handler: Arc<dyn Handler> = Arc::new(hestia_core::not_found());
        let served = driver
            .listen_and_serve("127.0.0.1:0".parse().unwrap(), handler)
            .await;
        assert!(matches!(served, Err(ServerError::Shutdown(_))));
    }

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let driver = Arc::new(HyperDriver::new());
        let handler: Arc<dyn Handler> = Arc::new(handler_fn(|ctx, req, res| {
            let peer = ctx.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default();
            let path = req.uri().path().to_string();
            Box::pin(async move {
                res.write_header(StatusCode::ACCEPTED);
                res.write_all(format!("{path} from {peer}").as_bytes()).unwrap();
            })
        }));

        let serving = Arc::clone(&driver);
        let serve = tokio::spawn(async move {
            serving
                .listen_and_serve("127.0.0.1:0".parse().unwrap(), handler)
                .await
        });
        let addr = driver.bound_addr().await.unwrap();

        let response = get(addr, "/jobs").await;
        assert!(response.starts_with("HTTP/1.1 202 Accepted"));
        assert!(response.contains("/jobs from 127.0.0.1"));

        driver
            .shutdown(ShutdownContext::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        serve.await.unwrap().unwrap();
        assert_eq!(driver.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let driver = HyperDriver::new();
        let handler: Arc<dyn Handler> = Arc::new(hestia_core::not_found());
        let err = driver.listen_and_serve(addr, handler).await.unwrap_err();

        assert!(err.to_string().starts_with("bind error: failed to bind to"));
    }

    #[test]
    fn test_no_tls_capability() {
        assert!(HyperDriver::new().tls().is_none());
        assert_eq!(HyperDriver::new().name(), "hyper");
    }
}
