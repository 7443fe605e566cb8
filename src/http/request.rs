//! Request identity.
//!
//! # Responsibilities
//! - Generate a correlation id (UUID v4) per request, for logs only
//! - Assign a process-unique exchange id that keys all per-request state
//! - Hold the exchange → correlation id association while a request is live
//!
//! # Design Decisions
//! - The correlation id never leaves the process (no response header)
//! - Entries are removed explicitly when the request is finalized

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Fallback label used in logs when an exchange has no live correlation id.
pub const UNKNOWN_REQUEST: &str = "unknown-request";

/// Relaxed ordering is enough, ids only need to be unique.
static EXCHANGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Correlation id for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    /// Allocate the next exchange id.
    pub fn next() -> Self {
        Self(EXCHANGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exchange-{}", self.0)
    }
}

/// Live exchange → correlation id associations.
#[derive(Debug, Default)]
pub struct RequestIds {
    inner: DashMap<ExchangeId, RequestId>,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a correlation id with an exchange.
    pub fn register(&self, exchange: ExchangeId, id: RequestId) {
        self.inner.insert(exchange, id);
    }

    /// Look up the correlation id of a live exchange.
    pub fn get(&self, exchange: ExchangeId) -> Option<RequestId> {
        self.inner.get(&exchange).map(|entry| *entry.value())
    }

    /// Correlation id rendered for logs, `unknown-request` once released.
    pub fn label(&self, exchange: ExchangeId) -> String {
        self.get(exchange)
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNKNOWN_REQUEST.to_string())
    }

    /// Drop the association. Safe to call more than once.
    pub fn release(&self, exchange: ExchangeId) {
        self.inner.remove(&exchange);
    }

    /// Number of requests currently being processed.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
