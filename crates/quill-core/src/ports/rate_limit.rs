//! Rate limiting ports.

use async_trait::async_trait;
use std::time::Duration;

/// State of one fixed window for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    /// Epoch milliseconds at which the window closes.
    pub reset_at_ms: u64,
}

/// Storage for per-key window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request against `key`.
    ///
    /// Opens a fresh window (count 1, reset at `now_ms + window`) when the key
    /// is unknown or its window has closed (`now_ms >= reset_at_ms`).
    /// Otherwise increments the count and leaves `reset_at_ms` alone.
    async fn hit(&self, key: &str, now_ms: u64, window: Duration)
    -> Result<WindowEntry, RateLimitError>;

    /// Drop entries whose window has closed. Returns how many were removed.
    async fn purge_expired(&self, now_ms: u64) -> Result<usize, RateLimitError>;
}

/// Rate limiter trait - abstraction over rate limiting policies.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count a request for `key` and decide whether it may proceed.
    async fn admit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;

    /// Policy name, used to namespace keys and in logs.
    fn name(&self) -> &str;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}
