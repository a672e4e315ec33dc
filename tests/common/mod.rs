#![allow(dead_code)]

use async_trait::async_trait;
use shortlink::application::services::{RateLimitConfig, RateLimiter};
use shortlink::bootstrap::{self, Services};
use shortlink::config::Config;
use shortlink::infrastructure::persistence::InMemoryUrlRepository;
use shortlink::infrastructure::rate_limit::{
    BucketSpec, BucketState, MemoryRateLimitStore, RateLimitStore, RateLimitStoreError,
    StoreResult, WindowAcquire, WindowSnapshot,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub fn test_config() -> Config {
    Config {
        side_effect_queue_capacity: 1_000,
        ..Config::default()
    }
}

pub fn create_test_services() -> Services<InMemoryUrlRepository> {
    bootstrap::in_memory(&test_config())
}

pub fn memory_limiter(config: RateLimitConfig) -> RateLimiter {
    RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), config)
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Store whose every call fails, as if Redis were unreachable.
pub struct UnreachableStore;

fn unreachable() -> RateLimitStoreError {
    RateLimitStoreError::Connection("connection refused".to_string())
}

#[async_trait]
impl RateLimitStore for UnreachableStore {
    async fn increment_with_expiry(&self, _key: &str, _expiry: Duration) -> StoreResult<u64> {
        Err(unreachable())
    }

    async fn get_count(&self, _key: &str) -> StoreResult<u64> {
        Err(unreachable())
    }

    async fn sliding_window_acquire(
        &self,
        _key: &str,
        _now_ms: i64,
        _window: Duration,
        _limit: u64,
    ) -> StoreResult<WindowAcquire> {
        Err(unreachable())
    }

    async fn sliding_window_snapshot(
        &self,
        _key: &str,
        _now_ms: i64,
        _window: Duration,
    ) -> StoreResult<WindowSnapshot> {
        Err(unreachable())
    }

    async fn token_bucket_acquire(
        &self,
        _key: &str,
        _now_ms: i64,
        _spec: BucketSpec,
    ) -> StoreResult<BucketState> {
        Err(unreachable())
    }

    async fn token_bucket_peek(
        &self,
        _key: &str,
        _now_ms: i64,
        _spec: BucketSpec,
    ) -> StoreResult<f64> {
        Err(unreachable())
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Err(unreachable())
    }

    async fn health_check(&self) -> bool {
        false
    }
}
