mod common;

use shortlink::application::services::{
    FailurePolicy, RateLimitAlgorithm, RateLimitConfig, RateLimiter,
};
use shortlink::error::AppError;
use shortlink::utils::rate_limit_key::RateLimitKey;
use std::sync::Arc;
use std::time::Duration;

fn config(algorithm: RateLimitAlgorithm, limit: u64, window: Duration) -> RateLimitConfig {
    RateLimitConfig {
        algorithm,
        limit,
        window,
        ..RateLimitConfig::default()
    }
}

#[tokio::test]
async fn test_sliding_window_recovers_after_window() {
    let limiter = common::memory_limiter(config(
        RateLimitAlgorithm::SlidingWindow,
        5,
        Duration::from_secs(1),
    ));

    for _ in 0..5 {
        assert!(limiter.allow("client").await.unwrap());
    }
    assert!(!limiter.allow("client").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(limiter.allow("client").await.unwrap());
}

#[tokio::test]
async fn test_token_bucket_burst_then_refill() {
    let limiter = common::memory_limiter(RateLimitConfig {
        burst: Some(3),
        ..config(RateLimitAlgorithm::TokenBucket, 3, Duration::from_secs(1))
    });

    for _ in 0..3 {
        assert!(limiter.allow("client").await.unwrap());
    }
    assert!(!limiter.allow("client").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(limiter.allow("client").await.unwrap());
}

#[tokio::test]
async fn test_fixed_window_enforce() {
    let limiter = common::memory_limiter(config(
        RateLimitAlgorithm::FixedWindow,
        2,
        Duration::from_secs(3600),
    ));

    limiter.enforce("client").await.unwrap();
    limiter.enforce("client").await.unwrap();

    let err = limiter.enforce("client").await.unwrap_err();
    assert!(matches!(err, AppError::RateLimitExceeded { .. }));
    assert!(err.is_retryable());

    let retry_after = err.details()["retry_after_secs"].as_u64().unwrap();
    assert!((1..=3600).contains(&retry_after));
}

#[tokio::test]
async fn test_keys_are_independent() {
    let limiter = common::memory_limiter(config(
        RateLimitAlgorithm::SlidingWindow,
        1,
        Duration::from_secs(60),
    ));

    let alice = RateLimitKey::user("alice").to_string();
    let ip = RateLimitKey::ip("::ffff:203.0.113.7").to_string();

    assert!(limiter.allow(&alice).await.unwrap());
    assert!(!limiter.allow(&alice).await.unwrap());
    assert!(limiter.allow(&ip).await.unwrap());

    // The mapped and plain forms of an address share one budget.
    let plain = RateLimitKey::ip("203.0.113.7").to_string();
    assert!(!limiter.allow(&plain).await.unwrap());
}

#[tokio::test]
async fn test_info_and_reset() {
    let limiter = common::memory_limiter(config(
        RateLimitAlgorithm::SlidingWindow,
        3,
        Duration::from_secs(60),
    ));

    limiter.allow("client").await.unwrap();
    limiter.allow("client").await.unwrap();

    let info = limiter.info("client").await.unwrap();
    assert_eq!(info.count, 2);
    assert_eq!(info.limit, 3);
    assert_eq!(info.remaining, 1);

    // Peeking does not consume.
    assert_eq!(limiter.info("client").await.unwrap().count, 2);

    limiter.reset("client").await.unwrap();
    assert_eq!(limiter.info("client").await.unwrap().remaining, 3);
}

#[tokio::test]
async fn test_concurrent_requests_never_exceed_limit() {
    for algorithm in [
        RateLimitAlgorithm::FixedWindow,
        RateLimitAlgorithm::SlidingWindow,
        RateLimitAlgorithm::TokenBucket,
    ] {
        let limiter = Arc::new(common::memory_limiter(config(
            algorithm,
            10,
            Duration::from_secs(60),
        )));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(
                async move { limiter.allow("shared").await.unwrap() },
            ));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10, "algorithm {algorithm}");
    }
}

#[tokio::test]
async fn test_store_outage_fails_open_by_default() {
    let limiter = RateLimiter::new(
        Arc::new(common::UnreachableStore),
        config(RateLimitAlgorithm::SlidingWindow, 1, Duration::from_secs(60)),
    );

    for _ in 0..3 {
        let decision = limiter.check("client").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.degraded);
    }
    assert!(!limiter.health_check().await);
}

#[tokio::test]
async fn test_store_outage_fails_closed_when_configured() {
    let limiter = RateLimiter::new(
        Arc::new(common::UnreachableStore),
        RateLimitConfig {
            failure_policy: FailurePolicy::FailClosed,
            ..config(RateLimitAlgorithm::TokenBucket, 1, Duration::from_secs(60))
        },
    );

    let err = limiter.allow("client").await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable { .. }));

    let err = limiter.info("client").await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable { .. }));
}
