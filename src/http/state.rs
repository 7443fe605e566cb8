//! Response write-state tracking.
//!
//! A response is *writeable* from arrival until its first write (or until
//! the connection goes away), then *written* forever. The set only holds
//! writeable exchanges, so marking written is a removal.

use dashmap::DashSet;

use crate::http::request::ExchangeId;

/// Tracks which in-flight responses may still be written.
#[derive(Debug, Default)]
pub struct ResponseTracker {
    writeable: DashSet<ExchangeId>,
}

impl ResponseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a response for writing.
    pub fn mark_writeable(&self, exchange: ExchangeId) {
        self.writeable.insert(exchange);
    }

    pub fn is_writeable(&self, exchange: ExchangeId) -> bool {
        self.writeable.contains(&exchange)
    }

    /// Finalize a response. Idempotent.
    pub fn mark_written(&self, exchange: ExchangeId) {
        self.writeable.remove(&exchange);
    }

    /// Atomically check and finalize.
    ///
    /// Returns `true` for exactly one caller per exchange; that caller owns
    /// the write.
    pub fn try_mark_written(&self, exchange: ExchangeId) -> bool {
        self.writeable.remove(&exchange).is_some()
    }

    /// Number of responses still open for writing.
    pub fn open_count(&self) -> usize {
        self.writeable.len()
    }
}
