//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and the log filter before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.host {0:?} is not an IP address")]
    InvalidHost(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("observability.log_filter {filter:?} is invalid: {reason}")]
    InvalidLogFilter { filter: String, reason: String },

    #[error("metrics endpoint {0} collides with the listener")]
    MetricsCollision(String),
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener: Option<SocketAddr> = match config.listener.host.parse::<IpAddr>() {
        Ok(ip) => Some(SocketAddr::new(ip, config.listener.port)),
        Err(_) => {
            errors.push(ValidationError::InvalidHost(config.listener.host.clone()));
            None
        }
    };

    if let Some(metrics) = &config.observability.metrics_address {
        match metrics.parse::<SocketAddr>() {
            Ok(addr) if listener == Some(addr) && addr.port() != 0 => {
                errors.push(ValidationError::MetricsCollision(addr.to_string()));
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidMetricsAddress(metrics.clone())),
        }
    }

    if let Err(e) = EnvFilter::try_new(&config.observability.log_filter) {
        errors.push(ValidationError::InvalidLogFilter {
            filter: config.observability.log_filter.clone(),
            reason: e.to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
