//! Serves a couple of routes and shuts down cleanly on Ctrl+C or SIGTERM.
//!
//! ```text
//! cargo run -p hestia --example graceful
//! curl localhost:8080/          # Hello
//! curl localhost:8080/panic     # 500, the panic is logged
//! curl localhost:8080/healthz/readiness
//! ```
//!
//! Configuration is read from `hestia.toml` when present, then from
//! `HESTIA__*` environment variables.

use hestia::prelude::*;
use hestia_config::DEFAULT_ENV_PREFIX;
use std::sync::Arc;

fn routes() -> impl Handler {
    handler_fn(|_ctx, req, res| {
        let path = req.uri().path().to_string();
        Box::pin(async move {
            match path.as_str() {
                "/" => {
                    res.write_header(http::StatusCode::OK);
                    let _ = res.write_all(b"Hello");
                }
                "/panic" => panic!("server will recover from panic and log the error"),
                _ => {
                    res.write_header(http::StatusCode::NOT_FOUND);
                    let _ = res.write_all(b"404 page not found\n");
                }
            }
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new()
        .with_optional_file("hestia.toml")?
        .with_dotenv()?
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()?;
    init_logging(&config.log_config())?;

    let server = Arc::new(
        Server::builder()
            .config(config.server_config())
            .handler(routes())
            .health_check("config", || true)
            .build(),
    );

    tracing::info!(addr = server.config().http_addr(), "Server starting");
    let outcome = hestia::serve_until_signal(server).await?;

    if let Err(e) = outcome.result() {
        tracing::error!(error = %e, "Shut down didn't exit cleanly");
        std::process::exit(1);
    }
    tracing::info!("Shut down successfully");
    Ok(())
}
