//! End-to-end tests: a real listener, real sockets and the shutdown
//! orchestrator driven by an in-process signal source.

use hestia_core::handler_fn;
use hestia_server::shutdown::Shutdown;
use hestia_server::signal::{self, Signal};
use hestia_server::{HyperDriver, Server, ServerConfig};
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

fn server_with(driver: Arc<HyperDriver>, entered: Arc<Notify>) -> Server {
    Server::builder()
        .config(
            ServerConfig::builder()
                .http_addr("127.0.0.1:0")
                .service_name("graceful-test")
                .build(),
        )
        .shared_driver(driver)
        .handler(handler_fn(move |_ctx, req, res| {
            let slow = req.uri().path() == "/slow";
            let entered = Arc::clone(&entered);
            Box::pin(async move {
                if slow {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                res.write_header(StatusCode::OK);
                let _ = res.write_all(b"done");
            })
        }))
        .build()
}

#[tokio::test]
async fn test_serves_health_and_application_routes() {
    let driver = Arc::new(HyperDriver::new());
    let server = Arc::new(server_with(Arc::clone(&driver), Arc::new(Notify::new())));

    let serving = Arc::clone(&server);
    let serve = tokio::spawn(async move { serving.serve().await });
    let addr = driver.bound_addr().await.unwrap();

    let live = get(addr, "/healthz/liveness").await;
    assert!(live.starts_with("HTTP/1.1 200 OK"));
    assert!(live.ends_with("\r\n\r\nok"));

    let app = get(addr, "/fast").await;
    assert!(app.starts_with("HTTP/1.1 200 OK"));
    assert!(app.contains("done"));

    server
        .shutdown(hestia_server::ShutdownContext::with_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    serve.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_signal_drains_in_flight_request() {
    let driver = Arc::new(HyperDriver::new());
    let entered = Arc::new(Notify::new());
    let server = Arc::new(server_with(Arc::clone(&driver), Arc::clone(&entered)));

    let serving = Arc::clone(&server);
    let serve = tokio::spawn(async move { serving.serve().await });
    let addr = driver.bound_addr().await.unwrap();

    let in_flight = tokio::spawn(async move { get(addr, "/slow").await });
    entered.notified().await;

    let (sender, source) = signal::channel();
    let mut shutdown = Shutdown::builder(Duration::from_secs(5))
        .listener("http", Arc::clone(&server))
        .signal_source(source)
        .build();
    assert!(sender.send(Signal::Terminate));

    let outcome = shutdown.wait().await;

    assert_eq!(outcome.signal(), Some(Signal::Terminate));
    assert!(outcome.is_success());
    assert_eq!(outcome.reports().len(), 1);
    assert!(outcome.reports()[0].succeeded());

    let response = in_flight.await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("done"));

    serve.await.unwrap().unwrap();
    assert_eq!(driver.active_connections(), 0);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_listener_failure_fails_shutdown() {
    let (sender, source) = signal::channel();
    let mut shutdown = Shutdown::builder(Duration::from_secs(1))
        .listener(
            "broken",
            hestia_server::listener_fn(|_ctx| async {
                Err::<(), hestia_core::BoxError>("flush failed".into())
            }),
        )
        .signal_source(source)
        .build();
    sender.send(Signal::Interrupt);

    let outcome = shutdown.wait().await;

    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.to_string(), "shutdown completed with error");
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_listener_is_logged_by_name() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (sender, source) = signal::channel();
    let mut shutdown = Shutdown::builder(Duration::from_secs(1))
        .listener(
            "queue",
            hestia_server::listener_fn(|_ctx| async { Ok::<(), hestia_core::BoxError>(()) }),
        )
        .listener(
            "cache",
            hestia_server::listener_fn(|_ctx| async {
                Err::<(), hestia_core::BoxError>("disk full".into())
            }),
        )
        .signal_source(source)
        .build();
    sender.send(Signal::Hangup);

    let outcome = shutdown.wait().await;

    assert!(outcome.is_success());
    let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
    assert!(output.contains("Received signal hangup, shutting down"));
    assert!(output.contains("Shutdown listener returned an error"));
    assert!(output.contains("listener=cache"));
    assert!(output.contains("disk full"));
}
