//! Shared Redis connection setup.
//!
//! The cache and the rate-limit store can share one [`ConnectionManager`];
//! it multiplexes commands and reconnects on its own.

use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{info, warn};

/// Number of connection attempts after the first failure.
const CONNECT_RETRIES: usize = 3;

/// Connects to Redis with exponential backoff and validates the connection
/// with a PING.
///
/// # Errors
///
/// Returns the last [`RedisError`] if the URL is invalid or every attempt fails.
pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    info!("Connecting to Redis");

    let client = Client::open(redis_url)?;

    let strategy = ExponentialBackoff::from_millis(50)
        .max_delay(Duration::from_secs(2))
        .map(jitter)
        .take(CONNECT_RETRIES);

    let manager = Retry::spawn(strategy, || {
        let client = client.clone();
        async move {
            ConnectionManager::new(client).await.inspect_err(|e| {
                warn!(error = %e, "Redis connection attempt failed");
            })
        }
    })
    .await?;

    let mut test_conn = manager.clone();
    test_conn.ping::<()>().await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Classification shared by the Redis-backed stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RedisFailure {
    Connection,
    Timeout,
    Operation,
}

pub(crate) fn classify_redis_error(err: &RedisError) -> RedisFailure {
    if err.is_timeout() {
        RedisFailure::Timeout
    } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        RedisFailure::Connection
    } else {
        RedisFailure::Operation
    }
}
