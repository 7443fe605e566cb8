//! http-dispatch demo server.
//!
//! ```text
//!     Client Request
//!     ──────▶ axum (TraceLayer) ──▶ Dispatcher ──▶ Router ──▶ handler
//!                                       │                        │
//!     Client Response                   ▼                        ▼
//!     ◀────── transport ◀──── ResponseHandle ◀── send / send_error
//! ```
//!
//! Serves a handful of routes that exercise the toolkit:
//! - `GET /health`: JSON status
//! - `GET /version`: plain-text version
//! - `GET /hello/:name`: JSON or text depending on `Accept`

use axum::http::Method;
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use http_dispatch::config::loader::load_config_with;
use http_dispatch::config::validation::validate_config;
use http_dispatch::config::{ConfigError, ServerConfig};
use http_dispatch::http::{HttpServer, Json, Payload};
use http_dispatch::lifecycle::{signals::trigger_on_signal, Shutdown};
use http_dispatch::observability::{logging::init_logging, metrics::init_metrics};
use http_dispatch::routing::{HandlerContext, RouteError, Router};

#[derive(Parser)]
#[command(name = "http-dispatch")]
#[command(about = "Minimal HTTP server built on the http-dispatch toolkit", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Expose error details and pretty-print JSON
    #[arg(long)]
    development: bool,
}

#[derive(Serialize)]
struct Greeting {
    greeting: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = resolve_config(&args, |key| std::env::var(key).ok())?;

    init_logging(&config.observability).map_err(|e| e as Box<dyn std::error::Error>)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        development = config.development,
        request_timeout_secs = config.dispatch.request_timeout_secs,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        let addr: SocketAddr = addr.parse()?;
        init_metrics(addr)?;
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(trigger_on_signal(shutdown));

    let server = HttpServer::new(config, routes()?);
    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// File and environment, then CLI flags, validated as a whole.
fn resolve_config<F>(args: &Args, env: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_config_with(args.config.as_deref(), env)?;
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    config.development |= args.development;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn routes() -> Result<Router, RouteError> {
    let mut router = Router::new();
    router
        .add_handler(Method::GET, "/health", |_cx: HandlerContext| async {
            Ok(serde_json::json!({ "status": "ok" }))
        })?
        .add_handler(Method::GET, "/version", |_cx: HandlerContext| async {
            Ok(env!("CARGO_PKG_VERSION"))
        })?
        .add_handler(
            Method::GET,
            "/hello/:name",
            |cx: HandlerContext| async move {
                let greeting = format!("hello, {}", cx.param("name").unwrap_or("stranger"));
                let payload: Payload = if cx.accepts_json() {
                    Json(Greeting { greeting }).into()
                } else {
                    greeting.into()
                };
                Ok(payload)
            },
        )?;
    Ok(router)
}
