//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the dispatcher
//! - Wire up middleware (tracing)
//! - Bind server to listener and stop on shutdown

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::dispatcher::Dispatcher;
use crate::lifecycle::shutdown::signalled;
use crate::routing::Router as RouteTable;

/// HTTP server for an application's route table.
pub struct HttpServer {
    router: Router,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server for `routes` with the given configuration.
    pub fn new(config: ServerConfig, routes: RouteTable) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_config(routes, &config));
        let router = Self::build_router(Arc::clone(&dispatcher));
        Self {
            router,
            dispatcher,
            config,
        }
    }

    /// Build the Axum router. Routing is the dispatcher's job, so every
    /// request lands in the fallback.
    fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .fallback(dispatch_request)
            .with_state(dispatcher)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            development = self.config.development,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signalled(shutdown))
            .await?;

        tracing::info!(
            in_flight = self.dispatcher.in_flight(),
            "HTTP server stopped"
        );
        Ok(())
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn dispatch_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request<Body>,
) -> Response<Body> {
    dispatcher.dispatch(request).await
}
