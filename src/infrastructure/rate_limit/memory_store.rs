//! In-process rate limit store.

use super::store::{
    BucketSpec, BucketState, RateLimitStore, StoreResult, WindowAcquire, WindowSnapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Entry count at which inserts start sweeping stale state.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Window {
    events: VecDeque<i64>,
    window_ms: i64,
}

impl Window {
    fn prune(&mut self, now_ms: i64, window: Duration) {
        self.window_ms = window_ms(window);
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while self.events.front().is_some_and(|&ts| ts <= cutoff) {
            self.events.pop_front();
        }
    }

    fn is_stale(&self, now_ms: i64) -> bool {
        self.events
            .back()
            .is_none_or(|&last| last <= now_ms.saturating_sub(self.window_ms))
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill_ms: i64,
    /// When the bucket is back at capacity and equivalent to a fresh one.
    full_at_ms: i64,
}

impl Bucket {
    fn full(spec: BucketSpec, now_ms: i64) -> Self {
        Self {
            tokens: spec.capacity,
            last_refill_ms: now_ms,
            full_at_ms: now_ms,
        }
    }

    fn refilled(self, spec: BucketSpec, now_ms: i64) -> Self {
        let window_ms = spec.window.as_millis().max(1) as f64;
        let elapsed = (now_ms - self.last_refill_ms).max(0) as f64;
        Self {
            tokens: (self.tokens + elapsed * spec.refill_per_window / window_ms)
                .min(spec.capacity),
            last_refill_ms: now_ms.max(self.last_refill_ms),
            full_at_ms: self.full_at_ms,
        }
    }

    fn with_full_at(mut self, spec: BucketSpec) -> Self {
        let missing = (spec.capacity - self.tokens).max(0.0);
        let window_ms = spec.window.as_millis().max(1) as f64;
        let wait_ms = if spec.refill_per_window > 0.0 {
            (missing * window_ms / spec.refill_per_window)
                .ceil()
                .min(i64::MAX as f64) as i64
        } else {
            i64::MAX
        };
        self.full_at_ms = self.last_refill_ms.saturating_add(wait_ms);
        self
    }
}

/// Rate limit state held in [`DashMap`]s.
///
/// Each operation runs under the shard lock of its key, so per-key updates
/// are atomic within the process. Limits are not shared across instances;
/// use [`super::RedisRateLimitStore`] for that.
///
/// Expired counters, drained windows and refilled buckets are swept once the
/// store passes a size threshold, so idle keys do not accumulate.
#[derive(Debug)]
pub struct MemoryRateLimitStore {
    counters: DashMap<String, Counter>,
    windows: DashMap<String, Window>,
    buckets: DashMap<String, Bucket>,
    next_sweep: AtomicUsize,
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self {
            counters: DashMap::new(),
            windows: DashMap::new(),
            buckets: DashMap::new(),
            next_sweep: AtomicUsize::new(SWEEP_THRESHOLD),
        }
    }
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding state.
    pub fn len(&self) -> usize {
        self.counters.len() + self.windows.len() + self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops state that no longer affects any decision and returns how many
    /// keys were removed.
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let before = self.len();
        let now = Instant::now();

        self.counters.retain(|_, c| now < c.expires_at);
        self.windows.retain(|_, w| !w.is_stale(now_ms));
        self.buckets.retain(|_, b| now_ms < b.full_at_ms);

        let removed = before.saturating_sub(self.len());
        if removed > 0 {
            debug!(removed, remaining = self.len(), "Purged idle rate limit keys");
        }
        removed
    }

    /// Sweeps when the store has doubled since the last sweep. Must not be
    /// called while holding an entry guard.
    fn maybe_sweep(&self, now_ms: i64) {
        if self.len() < self.next_sweep.load(Ordering::Relaxed) {
            return;
        }
        self.purge_expired(now_ms);
        let next = (self.len() * 2).max(SWEEP_THRESHOLD);
        self.next_sweep.store(next, Ordering::Relaxed);
    }
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment_with_expiry(&self, key: &str, expiry: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let count = {
            let mut entry = self.counters.entry(key.to_owned()).or_insert(Counter {
                count: 0,
                expires_at: now + expiry,
            });

            if now >= entry.expires_at {
                entry.count = 0;
            }
            entry.count += 1;
            entry.expires_at = now + expiry;
            entry.count
        };

        self.maybe_sweep(Utc::now().timestamp_millis());
        Ok(count)
    }

    async fn get_count(&self, key: &str) -> StoreResult<u64> {
        Ok(self
            .counters
            .get(key)
            .filter(|c| Instant::now() < c.expires_at)
            .map_or(0, |c| c.count))
    }

    async fn sliding_window_acquire(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> StoreResult<WindowAcquire> {
        let outcome = {
            let mut state = self.windows.entry(key.to_owned()).or_default();
            state.prune(now_ms, window);

            let allowed = (state.events.len() as u64) < limit;
            if allowed {
                // Keep the deque ordered even if callers' clocks step backwards.
                let ts = state.events.back().map_or(now_ms, |&last| last.max(now_ms));
                state.events.push_back(ts);
            }

            WindowAcquire {
                allowed,
                count: state.events.len() as u64,
                oldest_ms: state.events.front().copied(),
            }
        };

        self.maybe_sweep(now_ms);
        Ok(outcome)
    }

    async fn sliding_window_snapshot(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> StoreResult<WindowSnapshot> {
        let Some(mut state) = self.windows.get_mut(key) else {
            return Ok(WindowSnapshot {
                count: 0,
                oldest_ms: None,
            });
        };
        state.prune(now_ms, window);

        Ok(WindowSnapshot {
            count: state.events.len() as u64,
            oldest_ms: state.events.front().copied(),
        })
    }

    async fn token_bucket_acquire(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
    ) -> StoreResult<BucketState> {
        let state = {
            let mut bucket = self
                .buckets
                .entry(key.to_owned())
                .or_insert_with(|| Bucket::full(spec, now_ms));

            let mut refilled = bucket.refilled(spec, now_ms);
            let allowed = refilled.tokens >= 1.0;
            if allowed {
                refilled.tokens -= 1.0;
            }
            *bucket = refilled.with_full_at(spec);

            BucketState {
                allowed,
                tokens: refilled.tokens,
            }
        };

        self.maybe_sweep(now_ms);
        Ok(state)
    }

    async fn token_bucket_peek(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
    ) -> StoreResult<f64> {
        Ok(self
            .buckets
            .get(key)
            .map_or(spec.capacity, |b| b.refilled(spec, now_ms).tokens))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.counters.remove(key);
        self.windows.remove(key);
        self.buckets.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
