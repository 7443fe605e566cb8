//! Route constraints.
//!
//! # Responsibilities
//! - Decide whether a request satisfies a route's extra conditions
//! - Host header matching (exact, case-insensitive)
//!
//! # Design Decisions
//! - Host matching ignores the port and is case-insensitive (RFC 9110)
//! - A route with several constraints needs all of them (AND semantics)

use axum::body::Body;
use axum::http::{header::HOST, Request};

/// Condition a request must meet for a route to match.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let host = req
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().host());

        host.map(strip_port)
            .map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.strip_prefix('[').and_then(|rest| rest.find(']')) {
        return &host[..end + 2];
    }
    host.split(':').next().unwrap_or(host)
}

/// Extra matching options for a route.
#[derive(Debug, Default)]
pub struct RouteOptions {
    constraints: Vec<Box<dyn Matcher>>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only match requests for `host`.
    pub fn host(self, host: impl Into<String>) -> Self {
        self.constraint(HostMatcher::new(host))
    }

    /// Add a custom constraint.
    pub fn constraint(mut self, matcher: impl Matcher + 'static) -> Self {
        self.constraints.push(Box::new(matcher));
        self
    }

    pub fn is_constrained(&self) -> bool {
        !self.constraints.is_empty()
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.constraints.iter().all(|m| m.matches(req))
    }
}
