//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Route::new(methods, pattern, handler)
//!         .with_options(..)   (host constraint, custom matchers)
//!         .with_store(..)     (opaque per-route payload)
//!     → router.rs (insert into the method's radix tree)
//!
//! Per request:
//!     method + path + request
//!     → router.rs (radix lookup, params)
//!     → matcher.rs (evaluate route constraints)
//!     → RouteMatch or no match
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod matcher;
pub mod router;

pub use handler::{sync, Handler, HandlerContext, HandlerFuture, Params, Store};
pub use matcher::{HostMatcher, Matcher, RouteOptions};
pub use router::{IntoMethods, Route, RouteError, RouteMatch, Router};
