//! Service wiring and runtime setup.
//!
//! Handles database connections, Redis setup, fallbacks and spawning of the
//! side-effect worker.

use crate::application::services::{LinkService, RateLimiter, RedirectResolver};
use crate::config::{Config, mask_connection_string};
use crate::domain::repositories::{AnalyticsRecorder, UrlRepository};
use crate::domain::side_effects::{SideEffectQueue, run_side_effect_worker};
use crate::infrastructure::analytics::TracingAnalytics;
use crate::infrastructure::cache::{CacheService, MemoryCache, NullCache, RedisCache};
use crate::infrastructure::persistence::{InMemoryUrlRepository, PgUrlRepository};
use crate::infrastructure::rate_limit::{
    MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore,
};
use crate::infrastructure::redis_connection::connect_redis;
use crate::state::AppState;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Running services plus the handle of their side-effect worker.
pub struct Services<R: UrlRepository> {
    pub state: AppState<R>,
    worker: JoinHandle<()>,
}

impl<R: UrlRepository> Services<R> {
    /// Drops this state and waits for queued side effects to finish.
    ///
    /// Blocks until every clone of the state has been dropped too.
    pub async fn shutdown(self) {
        let Services { state, worker } = self;
        drop(state);

        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Side-effect worker panicked");
        }
    }
}

/// Connects to PostgreSQL and Redis and wires the services.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - Redis cache and rate-limit store (or `NullCache` and a per-process store)
/// - Background side-effect worker
///
/// # Errors
///
/// Returns an error if:
/// - No database is configured
/// - Database connection fails
/// - Migrations fail
pub async fn connect(config: &Config) -> Result<Services<PgUrlRepository>> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to connect to PostgreSQL")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .connect(database_url)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to database at {}",
                mask_connection_string(database_url)
            )
        })?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let (cache, store): (Arc<dyn CacheService>, Arc<dyn RateLimitStore>) =
        if let Some(redis_url) = &config.redis_url {
            match connect_redis(redis_url).await {
                Ok(conn) => {
                    tracing::info!("Cache and rate-limit store enabled (Redis)");
                    (
                        Arc::new(RedisCache::new(
                            conn.clone(),
                            config.cache_ttl(),
                            config.remote_timeout(),
                        )),
                        Arc::new(RedisRateLimitStore::new(conn, config.remote_timeout())),
                    )
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to connect to Redis: {}. Using NullCache and per-process rate limits.",
                        e
                    );
                    (
                        Arc::new(NullCache::new()),
                        Arc::new(MemoryRateLimitStore::new()),
                    )
                }
            }
        } else {
            tracing::info!("Cache disabled (NullCache), rate limits are per process");
            (
                Arc::new(NullCache::new()),
                Arc::new(MemoryRateLimitStore::new()),
            )
        };

    let repository = Arc::new(PgUrlRepository::new(Arc::new(pool)));

    Ok(assemble(
        config,
        repository,
        cache,
        store,
        Arc::new(TracingAnalytics),
    ))
}

/// Wires the services against in-process stores.
///
/// Must be called from within a Tokio runtime.
pub fn in_memory(config: &Config) -> Services<InMemoryUrlRepository> {
    tracing::info!("Using in-memory repository, cache and rate-limit store");

    assemble(
        config,
        Arc::new(InMemoryUrlRepository::new()),
        Arc::new(MemoryCache::new(config.cache_ttl())),
        Arc::new(MemoryRateLimitStore::new()),
        Arc::new(TracingAnalytics),
    )
}

/// Wires services around the given stores and spawns the side-effect worker.
///
/// Must be called from within a Tokio runtime.
pub fn assemble<R>(
    config: &Config,
    repository: Arc<R>,
    cache: Arc<dyn CacheService>,
    store: Arc<dyn RateLimitStore>,
    analytics: Arc<dyn AnalyticsRecorder>,
) -> Services<R>
where
    R: UrlRepository + 'static,
{
    let (side_effects, rx) = SideEffectQueue::bounded(config.side_effect_queue_capacity);

    let worker = tokio::spawn(run_side_effect_worker(
        rx,
        Arc::clone(&repository),
        Arc::clone(&cache),
        analytics,
        config.side_effect_concurrency,
    ));

    let links = Arc::new(LinkService::new(
        Arc::clone(&repository),
        Arc::clone(&cache),
        config.link_settings(),
    ));

    let resolver = Arc::new(RedirectResolver::new(
        Arc::clone(&repository),
        Arc::clone(&cache),
        side_effects.clone(),
        config.cache_ttl(),
        config.remote_timeout(),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(store, config.rate_limit_config()));

    Services {
        state: AppState {
            repository,
            cache,
            links,
            resolver,
            rate_limiter,
            side_effects,
        },
        worker,
    }
}
