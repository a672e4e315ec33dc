//! Distributed rate limiting.
//!
//! Three policies share one contract. The policy is chosen once, when the
//! limiter is built; every instance pointed at the same store and prefix
//! enforces one shared limit.
//!
//! | Policy | Store state | Window |
//! |---|---|---|
//! | Fixed window | counter per `(key, bucket)` | hard edges, up to 2x limit across a boundary |
//! | Sliding window | timestamps inside the trailing window | smooth |
//! | Token bucket | `(tokens, last_refill)` | smooth, bursts up to capacity |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::infrastructure::rate_limit::{BucketSpec, RateLimitStore, RateLimitStoreError};

/// Rate limiting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    FixedWindow,
    #[default]
    SlidingWindow,
    TokenBucket,
}

impl RateLimitAlgorithm {
    /// Parses a policy name. Unknown names select the sliding window.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_window" | "fixed" => Self::FixedWindow,
            "sliding_window" | "sliding" => Self::SlidingWindow,
            "token_bucket" | "bucket" => Self::TokenBucket,
            other => {
                warn!(algorithm = other, "Unknown rate limit algorithm, using sliding window");
                Self::SlidingWindow
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
            Self::TokenBucket => "token_bucket",
        }
    }

    fn key_segment(&self) -> &'static str {
        match self {
            Self::FixedWindow => "fw",
            Self::SlidingWindow => "sw",
            Self::TokenBucket => "tb",
        }
    }
}

impl fmt::Display for RateLimitAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Allow the request.
    #[default]
    FailOpen,
    /// Report the limiter as unavailable.
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithm,
    /// Requests per window; for the token bucket, tokens refilled per window.
    pub limit: u64,
    pub window: Duration,
    /// Token-bucket capacity. Defaults to `limit`.
    pub burst: Option<u64>,
    pub key_prefix: String,
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: RateLimitAlgorithm::default(),
            limit: 100,
            window: Duration::from_secs(60),
            burst: None,
            key_prefix: "ratelimit".to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RateLimitConfig {
    fn capacity(&self) -> u64 {
        self.burst.unwrap_or(self.limit)
    }

    fn bucket_spec(&self) -> BucketSpec {
        BucketSpec {
            capacity: self.capacity() as f64,
            refill_per_window: self.limit.max(1) as f64,
            window: self.window,
        }
    }
}

/// Introspection snapshot for a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitInfo {
    /// Requests counted against the current window (tokens used, for the bucket).
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// When the key's state fully resets.
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub info: RateLimitInfo,
    /// How long until a retry can succeed; zero when allowed.
    pub retry_after: Duration,
    /// True when the store failed and the failure policy decided.
    pub degraded: bool,
}

/// Rate limiter over a [`RateLimitStore`].
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn algorithm(&self) -> RateLimitAlgorithm {
        self.config.algorithm
    }

    /// Records one request for `key` and reports whether it may proceed.
    ///
    /// # Errors
    ///
    /// Only under [`FailurePolicy::FailClosed`], when the store fails.
    pub async fn allow(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.check(key).await?.allowed)
    }

    /// Like [`Self::allow`] but returns the full decision.
    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, AppError> {
        let now = Utc::now();

        let decision = match self.acquire(key, now).await {
            Ok(decision) => decision,
            Err(e) => return self.on_store_error(key, now, e),
        };

        let label = if decision.allowed { "allowed" } else { "denied" };
        counter!(
            "shortlink_rate_limit_decisions_total",
            "algorithm" => self.config.algorithm.as_str(),
            "decision" => label
        )
        .increment(1);

        if !decision.allowed {
            debug!(
                key,
                algorithm = %self.config.algorithm,
                count = decision.info.count,
                limit = decision.info.limit,
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }

    /// Like [`Self::check`], but a denial becomes
    /// [`AppError::RateLimitExceeded`] carrying `retry_after_secs`.
    pub async fn enforce(&self, key: &str) -> Result<RateLimitDecision, AppError> {
        let decision = self.check(key).await?;
        if decision.allowed {
            return Ok(decision);
        }

        Err(AppError::rate_limited(
            "Rate limit exceeded",
            json!({
                "key": key,
                "limit": decision.info.limit,
                "retry_after_secs": ceil_secs(decision.retry_after),
                "reset_at": decision.info.reset_at,
            }),
        ))
    }

    /// Current state of `key` without recording a request.
    ///
    /// # Errors
    ///
    /// [`AppError::Unavailable`] if the store fails.
    pub async fn info(&self, key: &str) -> Result<RateLimitInfo, AppError> {
        let now = Utc::now();
        self.peek(key, now)
            .await
            .map_err(|e| store_unavailable(key, &e))
    }

    /// Clears all state for `key`.
    ///
    /// For the fixed window only the current bucket is cleared; older
    /// buckets expire on their own.
    pub async fn reset(&self, key: &str) -> Result<(), AppError> {
        let store_key = self.store_key(key, Utc::now());
        self.store
            .delete(&store_key)
            .await
            .map_err(|e| store_unavailable(key, &e))?;
        debug!(key, "Rate limit reset");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    fn store_key(&self, key: &str, now: DateTime<Utc>) -> String {
        let prefix = &self.config.key_prefix;
        let segment = self.config.algorithm.key_segment();
        match self.config.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                format!("{prefix}:{segment}:{key}:{}", self.bucket_index(now))
            }
            RateLimitAlgorithm::SlidingWindow | RateLimitAlgorithm::TokenBucket => {
                format!("{prefix}:{segment}:{key}")
            }
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.config.window.as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }

    fn bucket_index(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().div_euclid(self.window_ms())
    }

    fn bucket_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        from_millis((self.bucket_index(now) + 1) * self.window_ms())
    }

    async fn acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let limit = self.config.limit;
        let store_key = self.store_key(key, now);
        let now_ms = now.timestamp_millis();

        match self.config.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                let count = self
                    .store
                    .increment_with_expiry(&store_key, self.config.window)
                    .await?;
                let allowed = count <= limit;
                let reset_at = self.bucket_end(now);
                Ok(RateLimitDecision {
                    allowed,
                    info: RateLimitInfo {
                        count: count.min(limit),
                        limit,
                        remaining: limit.saturating_sub(count),
                        reset_at,
                    },
                    retry_after: if allowed { Duration::ZERO } else { until(now, reset_at) },
                    degraded: false,
                })
            }
            RateLimitAlgorithm::SlidingWindow => {
                let outcome = self
                    .store
                    .sliding_window_acquire(&store_key, now_ms, self.config.window, limit)
                    .await?;

                let (reset_at, retry_after) = if outcome.allowed {
                    (after(now, self.config.window), Duration::ZERO)
                } else {
                    // The next slot opens when the oldest event leaves the window.
                    let opens_at = outcome.oldest_ms.map_or_else(
                        || after(now, self.config.window),
                        |oldest| from_millis(oldest + self.window_ms()),
                    );
                    (opens_at, until(now, opens_at))
                };

                Ok(RateLimitDecision {
                    allowed: outcome.allowed,
                    info: RateLimitInfo {
                        count: outcome.count,
                        limit,
                        remaining: limit.saturating_sub(outcome.count),
                        reset_at,
                    },
                    retry_after,
                    degraded: false,
                })
            }
            RateLimitAlgorithm::TokenBucket => {
                let spec = self.config.bucket_spec();
                let state = self
                    .store
                    .token_bucket_acquire(&store_key, now_ms, spec)
                    .await?;

                let retry_after = if state.allowed {
                    Duration::ZERO
                } else {
                    self.refill_time(1.0 - state.tokens)
                };

                Ok(RateLimitDecision {
                    allowed: state.allowed,
                    info: self.bucket_info(state.tokens, now),
                    retry_after,
                    degraded: false,
                })
            }
        }
    }

    async fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitInfo, RateLimitStoreError> {
        let limit = self.config.limit;
        let store_key = self.store_key(key, now);
        let now_ms = now.timestamp_millis();

        match self.config.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                let count = self.store.get_count(&store_key).await?;
                Ok(RateLimitInfo {
                    count: count.min(limit),
                    limit,
                    remaining: limit.saturating_sub(count),
                    reset_at: self.bucket_end(now),
                })
            }
            RateLimitAlgorithm::SlidingWindow => {
                let snapshot = self
                    .store
                    .sliding_window_snapshot(&store_key, now_ms, self.config.window)
                    .await?;
                Ok(RateLimitInfo {
                    count: snapshot.count,
                    limit,
                    remaining: limit.saturating_sub(snapshot.count),
                    reset_at: snapshot
                        .oldest_ms
                        .map_or(now, |oldest| from_millis(oldest + self.window_ms())),
                })
            }
            RateLimitAlgorithm::TokenBucket => {
                let tokens = self
                    .store
                    .token_bucket_peek(&store_key, now_ms, self.config.bucket_spec())
                    .await?;
                Ok(self.bucket_info(tokens, now))
            }
        }
    }

    fn bucket_info(&self, tokens: f64, now: DateTime<Utc>) -> RateLimitInfo {
        let capacity = self.config.capacity();
        let remaining = (tokens.max(0.0).floor() as u64).min(capacity);
        let missing = capacity as f64 - tokens;
        RateLimitInfo {
            count: capacity - remaining,
            limit: capacity,
            remaining,
            reset_at: after(now, self.refill_time(missing)),
        }
    }

    /// Time to refill `tokens` tokens.
    fn refill_time(&self, tokens: f64) -> Duration {
        if tokens <= 0.0 {
            return Duration::ZERO;
        }
        let per_token = self.config.window.as_secs_f64() / self.config.limit.max(1) as f64;
        Duration::from_secs_f64(tokens * per_token)
    }

    fn on_store_error(
        &self,
        key: &str,
        now: DateTime<Utc>,
        error: RateLimitStoreError,
    ) -> Result<RateLimitDecision, AppError> {
        counter!("shortlink_rate_limit_store_errors_total").increment(1);

        match self.config.failure_policy {
            FailurePolicy::FailOpen => {
                warn!(key, error = %error, "Rate limit store failed, allowing request");
                counter!(
                    "shortlink_rate_limit_decisions_total",
                    "algorithm" => self.config.algorithm.as_str(),
                    "decision" => "fail_open"
                )
                .increment(1);

                let limit = self.config.limit;
                Ok(RateLimitDecision {
                    allowed: true,
                    info: RateLimitInfo {
                        count: 0,
                        limit,
                        remaining: limit,
                        reset_at: after(now, self.config.window),
                    },
                    retry_after: Duration::ZERO,
                    degraded: true,
                })
            }
            FailurePolicy::FailClosed => {
                warn!(key, error = %error, "Rate limit store failed, rejecting request");
                counter!(
                    "shortlink_rate_limit_decisions_total",
                    "algorithm" => self.config.algorithm.as_str(),
                    "decision" => "fail_closed"
                )
                .increment(1);
                Err(store_unavailable(key, &error))
            }
        }
    }
}

fn store_unavailable(key: &str, error: &RateLimitStoreError) -> AppError {
    AppError::unavailable(
        "Rate limiter unavailable",
        json!({ "key": key, "reason": error.to_string() }),
    )
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn after(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
