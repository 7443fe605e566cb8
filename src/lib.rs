//! Minimal HTTP server toolkit: routing, a guarded response writer and
//! consistent error bodies.

pub mod config;
pub mod http;
pub mod routing;

pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::{HttpError, HttpServer, Json, Payload, ResponseHandle};
pub use lifecycle::Shutdown;
pub use routing::{HandlerContext, Route, RouteOptions, Router};
