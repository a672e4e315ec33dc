//! Redis-backed rate limit store.
//!
//! Every policy runs as a Lua script so that the whole read-modify-write
//! happens server side. Expiries are set in milliseconds.

use super::store::{
    BucketSpec, BucketState, RateLimitStore, RateLimitStoreError, StoreResult, WindowAcquire,
    WindowSnapshot,
};
use crate::infrastructure::redis_connection::{RedisFailure, classify_redis_error};
use async_trait::async_trait;
use rand::Rng;
use redis::{AsyncCommands, RedisError, Script, aio::ConnectionManager};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

// KEYS[1] = counter; ARGV = expiry_ms
// The expiry is set by the first increment only, so it marks the end of the
// bucket instead of sliding with each request.
static FIXED_WINDOW_INCR: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
",
    )
});

// KEYS[1] = window set; ARGV = now_ms, window_ms, limit, member
static SLIDING_WINDOW_ACQUIRE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', key, window)
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    return {allowed, count, tonumber(oldest[2])}
end
return {allowed, count, -1}
",
    )
});

// KEYS[1] = window set; ARGV = now_ms, window_ms
static SLIDING_WINDOW_SNAPSHOT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    return {count, tonumber(oldest[2])}
end
return {count, -1}
",
    )
});

// KEYS[1] = bucket hash; ARGV = capacity, refill_per_window, window_ms, now_ms, consume
// Tokens are returned as a string to keep the fractional part.
static TOKEN_BUCKET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local now = tonumber(ARGV[4])
local consume = tonumber(ARGV[5])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil or last == nil then
    tokens = capacity
    last = now
end

local elapsed = math.max(0, now - last)
tokens = math.min(capacity, tokens + elapsed * refill / window)

local allowed = 0
if consume > 0 then
    if tokens >= consume then
        tokens = tokens - consume
        allowed = 1
    end
    redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill', now)
    redis.call('PEXPIRE', key, math.ceil(window * capacity / refill) + window)
end
return {allowed, tostring(tokens)}
",
    )
});

/// Rate limit store shared by every service instance through Redis.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    client: ConnectionManager,
    op_timeout: Duration,
}

impl RedisRateLimitStore {
    pub fn new(client: ConnectionManager, op_timeout: Duration) -> Self {
        Self { client, op_timeout }
    }

    async fn timed<T, F>(&self, op: &str, key: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_redis_error(op, key, &e)),
            Err(_) => Err(RateLimitStoreError::Timeout(format!(
                "{op} {key} exceeded {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }

    async fn run_token_bucket(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
        consume: u32,
    ) -> StoreResult<BucketState> {
        let mut conn = self.client.clone();
        let mut invocation = TOKEN_BUCKET.key(key);
        invocation
            .arg(spec.capacity)
            .arg(spec.refill_per_window)
            .arg(window_ms(spec.window))
            .arg(now_ms)
            .arg(consume);

        let (allowed, tokens): (i64, String) = self
            .timed(
                "EVALSHA token_bucket",
                key,
                invocation.invoke_async(&mut conn),
            )
            .await?;

        let tokens = tokens.parse::<f64>().map_err(|e| {
            RateLimitStoreError::InvalidResponse(format!("token count {tokens:?}: {e}"))
        })?;

        Ok(BucketState {
            allowed: allowed == 1,
            tokens,
        })
    }
}

fn map_redis_error(op: &str, key: &str, err: &RedisError) -> RateLimitStoreError {
    let message = format!("{op} {key}: {err}");
    match classify_redis_error(err) {
        RedisFailure::Timeout => RateLimitStoreError::Timeout(message),
        RedisFailure::Connection => RateLimitStoreError::Connection(message),
        RedisFailure::Operation => RateLimitStoreError::Operation(message),
    }
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment_with_expiry(&self, key: &str, expiry: Duration) -> StoreResult<u64> {
        let mut conn = self.client.clone();
        let mut invocation = FIXED_WINDOW_INCR.key(key);
        invocation.arg(window_ms(expiry));

        self.timed(
            "EVALSHA fixed_window",
            key,
            invocation.invoke_async(&mut conn),
        )
        .await
    }

    async fn get_count(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.client.clone();
        let count = self
            .timed("GET", key, conn.get::<_, Option<u64>>(key))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn sliding_window_acquire(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> StoreResult<WindowAcquire> {
        let mut conn = self.client.clone();
        // Members must be unique so that same-millisecond events all count.
        let member = format!("{now_ms}-{}", rand::rng().random::<u64>());

        let mut invocation = SLIDING_WINDOW_ACQUIRE.key(key);
        invocation
            .arg(now_ms)
            .arg(window_ms(window))
            .arg(limit)
            .arg(member);

        let (allowed, count, oldest): (i64, u64, i64) = self
            .timed(
                "EVALSHA sliding_window",
                key,
                invocation.invoke_async(&mut conn),
            )
            .await?;

        Ok(WindowAcquire {
            allowed: allowed == 1,
            count,
            oldest_ms: (oldest >= 0).then_some(oldest),
        })
    }

    async fn sliding_window_snapshot(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> StoreResult<WindowSnapshot> {
        let mut conn = self.client.clone();
        let mut invocation = SLIDING_WINDOW_SNAPSHOT.key(key);
        invocation.arg(now_ms).arg(window_ms(window));

        let (count, oldest): (u64, i64) = self
            .timed(
                "EVALSHA sliding_window_snapshot",
                key,
                invocation.invoke_async(&mut conn),
            )
            .await?;

        Ok(WindowSnapshot {
            count,
            oldest_ms: (oldest >= 0).then_some(oldest),
        })
    }

    async fn token_bucket_acquire(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
    ) -> StoreResult<BucketState> {
        self.run_token_bucket(key, now_ms, spec, 1).await
    }

    async fn token_bucket_peek(
        &self,
        key: &str,
        now_ms: i64,
        spec: BucketSpec,
    ) -> StoreResult<f64> {
        Ok(self.run_token_bucket(key, now_ms, spec, 0).await?.tokens)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.client.clone();
        self.timed("DEL", key, conn.del::<_, i64>(key)).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        matches!(
            tokio::time::timeout(self.op_timeout, conn.ping::<()>()).await,
            Ok(Ok(()))
        )
    }
}
