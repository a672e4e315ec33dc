//! Counter store abstraction used by the rate limiter.

use async_trait::async_trait;
use std::time::Duration;

/// Errors raised by a [`RateLimitStore`].
///
/// None of these reach the limiter's caller directly; the limiter applies
/// its failure policy (fail-open by default).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("Rate limit store connection error: {0}")]
    Connection(String),
    #[error("Rate limit store operation error: {0}")]
    Operation(String),
    #[error("Rate limit store operation timed out: {0}")]
    Timeout(String),
    #[error("Rate limit store returned an invalid response: {0}")]
    InvalidResponse(String),
}

pub type StoreResult<T> = Result<T, RateLimitStoreError>;

/// Result of a sliding-window acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAcquire {
    pub allowed: bool,
    /// Events inside the window after this call.
    pub count: u64,
    /// Timestamp (ms) of the oldest event still inside the window.
    pub oldest_ms: Option<i64>,
}

/// Read-only view of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u64,
    /// Timestamp (ms) of the oldest event still inside the window.
    pub oldest_ms: Option<i64>,
}

/// Result of a token-bucket acquisition or peek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub allowed: bool,
    /// Tokens left after refill (and consumption, if any).
    pub tokens: f64,
}

/// Token-bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpec {
    pub capacity: f64,
    /// Tokens added per `window`.
    pub refill_per_window: f64,
    pub window: Duration,
}

/// Remote counter store with the atomic operations each policy needs.
///
/// Every mutating operation must be atomic with respect to concurrent
/// callers on the same key, across processes when the store is shared.
/// Timestamps are milliseconds since the Unix epoch, supplied by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments `key` and sets its expiry in one atomic step, returning the
    /// new count.
    async fn increment_with_expiry(&self, key: &str, expiry: Duration) -> StoreResult<u64>;

    /// Current value of a fixed-window counter (0 when absent).
    async fn get_count(&self, key: &str) -> StoreResult<u64>;

    /// Prunes events at or before `now_ms - window`, counts the rest and
    /// records a new event at `now_ms` only when the count is under `limit`.
    /// The result carries the oldest surviving event so a denial needs no
    /// second round trip.
    async fn sliding_window_acquire(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> StoreResult<WindowAcquire>;

    /// Prunes and counts without recording an event.
    async fn sliding_window_snapshot(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> StoreResult<WindowSnapshot>;

    /// Refills the bucket for the elapsed time and consumes one token if
    /// available, as a single read-modify-write.
    async fn token_bucket_acquire(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
    ) -> StoreResult<BucketState>;

    /// Refilled token count without consuming or writing.
    async fn token_bucket_peek(&self, key: &str, now_ms: i64, spec: BucketSpec)
    -> StoreResult<f64>;

    /// Removes all state for `key`.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn health_check(&self) -> bool;
}
