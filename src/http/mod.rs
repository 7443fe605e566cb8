//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, everything to the fallback)
//!     → dispatcher.rs (correlation id, route, run handler)
//!     → send.rs / error.rs (serialize payload or error body)
//!     → response.rs (first write wins, hand off to transport)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod error;
pub mod negotiate;
pub mod request;
pub mod response;
pub mod send;
pub mod server;
pub mod state;

pub use dispatcher::Dispatcher;
pub use error::{ErrorBody, HttpError};
pub use request::{ExchangeId, RequestId};
pub use response::{Json, Payload, ResponseHandle};
pub use server::HttpServer;
