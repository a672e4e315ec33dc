//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheService, url_cache_key};
use crate::infrastructure::redis_connection::{RedisFailure, classify_redis_error};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Redis cache for fast URL lookups.
///
/// Every command runs under `op_timeout`. Errors are returned to the caller,
/// which is expected to degrade to the system of record.
#[derive(Clone)]
pub struct RedisCache {
    client: ConnectionManager,
    default_ttl: Duration,
    op_timeout: Duration,
}

impl RedisCache {
    /// Wraps an established connection (see
    /// [`crate::infrastructure::redis_connection::connect_redis`]).
    ///
    /// `default_ttl` applies when [`CacheService::set_url`] is called with
    /// `ttl = None`; it is controlled via the `CACHE_TTL_SECONDS` env var.
    pub fn new(client: ConnectionManager, default_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            client,
            default_ttl,
            op_timeout,
        }
    }

    async fn timed<T, F>(&self, op: &str, key: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_redis_error(op, key, &e)),
            Err(_) => Err(CacheError::Timeout(format!(
                "{op} {key} exceeded {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

fn map_redis_error(op: &str, key: &str, err: &RedisError) -> CacheError {
    let message = format!("{op} {key}: {err}");
    match classify_redis_error(err) {
        RedisFailure::Timeout => CacheError::Timeout(message),
        RedisFailure::Connection => CacheError::ConnectionError(message),
        RedisFailure::Operation => CacheError::OperationError(message),
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get_url(&self, short_code: &str) -> CacheResult<Option<String>> {
        let key = url_cache_key(short_code);
        let mut conn = self.client.clone();

        let value = self
            .timed("GET", &key, conn.get::<_, Option<String>>(&key))
            .await?;

        match &value {
            Some(url) => debug!(code = %short_code, url = %url, "Cache HIT"),
            None => debug!(code = %short_code, "Cache MISS"),
        }
        Ok(value)
    }

    async fn set_url(
        &self,
        short_code: &str,
        original_url: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = url_cache_key(short_code);
        let mut conn = self.client.clone();
        let ttl_seconds = ttl.unwrap_or(self.default_ttl).as_secs().max(1);

        self.timed(
            "SETEX",
            &key,
            conn.set_ex::<_, _, ()>(&key, original_url, ttl_seconds),
        )
        .await?;

        debug!(code = %short_code, ttl_seconds, "Cache SET");
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        let key = url_cache_key(short_code);
        let mut conn = self.client.clone();

        let deleted = self.timed("DEL", &key, conn.del::<_, i32>(&key)).await?;
        if deleted > 0 {
            debug!(code = %short_code, "Cache INVALIDATE");
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::redis_connection::connect_redis;

    async fn live_cache() -> RedisCache {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let conn = connect_redis(&url).await.expect("redis available");
        RedisCache::new(conn, Duration::from_secs(60), Duration::from_millis(500))
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_get_invalidate() {
        let cache = live_cache().await;

        cache
            .set_url("rcache01", "https://example.com/a", None)
            .await
            .unwrap();
        assert_eq!(
            cache.get_url("rcache01").await.unwrap().as_deref(),
            Some("https://example.com/a")
        );

        cache.invalidate("rcache01").await.unwrap();
        assert_eq!(cache.get_url("rcache01").await.unwrap(), None);

        // Deleting a missing key is not an error.
        cache.invalidate("rcache01").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_health_check() {
        let cache = live_cache().await;
        assert!(cache.health_check().await);
    }
}
