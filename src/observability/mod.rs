//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, writer and error mapper produce:
//!     → logging.rs (structured log events keyed by request_id)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
