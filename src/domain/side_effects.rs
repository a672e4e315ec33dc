//! Fire-and-forget work triggered by redirects.
//!
//! Resolution enqueues [`SideEffect`]s on a bounded channel and returns
//! immediately. A single worker drains the channel and runs each effect as
//! its own task, with at most `concurrency` in flight. Nothing here can
//! change a response that has already been returned: failures are logged
//! and counted, never retried.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::entities::AccessEvent;
use crate::domain::repositories::{AnalyticsRecorder, UrlRepository};
use crate::infrastructure::cache::CacheService;

/// A unit of detached work.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    IncrementClickCount { code: String },
    TouchLastAccessed { code: String },
    RecordAccess(AccessEvent),
    /// Opportunistic cleanup after a read found the record gone, expired or inactive.
    InvalidateCache { code: String },
}

impl SideEffect {
    /// Metric label for this effect.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncrementClickCount { .. } => "increment_click_count",
            Self::TouchLastAccessed { .. } => "touch_last_accessed",
            Self::RecordAccess(_) => "record_access",
            Self::InvalidateCache { .. } => "invalidate_cache",
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::IncrementClickCount { code }
            | Self::TouchLastAccessed { code }
            | Self::InvalidateCache { code } => code,
            Self::RecordAccess(event) => &event.short_code,
        }
    }
}

/// Sending half of the side-effect channel.
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Debug, Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    /// Creates a queue holding at most `capacity` pending effects.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<SideEffect>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues `effect` without waiting.
    ///
    /// Returns `false` when the effect was dropped because the queue is full
    /// or the worker has stopped.
    pub fn dispatch(&self, effect: SideEffect) -> bool {
        match self.tx.try_send(effect) {
            Ok(()) => true,
            Err(TrySendError::Full(effect)) => {
                warn!(
                    kind = effect.kind(),
                    code = %effect.code(),
                    "Side-effect queue full, dropping effect"
                );
                counter!("shortlink_side_effects_dropped_total", "kind" => effect.kind())
                    .increment(1);
                false
            }
            Err(TrySendError::Closed(effect)) => {
                error!(
                    kind = effect.kind(),
                    code = %effect.code(),
                    "Side-effect worker stopped, dropping effect"
                );
                counter!("shortlink_side_effects_dropped_total", "kind" => effect.kind())
                    .increment(1);
                false
            }
        }
    }
}

/// Drains `rx` until every [`SideEffectQueue`] handle is dropped, then waits
/// for in-flight effects to finish.
pub async fn run_side_effect_worker<R>(
    mut rx: mpsc::Receiver<SideEffect>,
    repository: Arc<R>,
    cache: Arc<dyn CacheService>,
    analytics: Arc<dyn AnalyticsRecorder>,
    concurrency: usize,
) where
    R: UrlRepository + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    info!(concurrency = concurrency.max(1), "Side-effect worker started");

    while let Some(effect) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };

        let repository = Arc::clone(&repository);
        let cache = Arc::clone(&cache);
        let analytics = Arc::clone(&analytics);

        tasks.spawn(async move {
            let _permit = permit;
            apply(effect, repository.as_ref(), cache.as_ref(), analytics.as_ref()).await;
        });

        // Reap finished tasks so the set does not grow.
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    info!("Side-effect worker stopped");
}

async fn apply<R: UrlRepository>(
    effect: SideEffect,
    repository: &R,
    cache: &dyn CacheService,
    analytics: &dyn AnalyticsRecorder,
) {
    let kind = effect.kind();
    let code = effect.code().to_owned();

    let result = match effect {
        SideEffect::IncrementClickCount { code } => repository
            .increment_click_count(&code)
            .await
            .map_err(|e| e.to_string()),
        SideEffect::TouchLastAccessed { code } => repository
            .update_last_accessed(&code)
            .await
            .map_err(|e| e.to_string()),
        SideEffect::RecordAccess(event) => analytics
            .record_access(event)
            .await
            .map_err(|e| e.to_string()),
        SideEffect::InvalidateCache { code } => {
            cache.invalidate(&code).await.map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(()) => debug!(kind, code = %code, "Side effect applied"),
        Err(e) => {
            warn!(kind, code = %code, error = %e, "Side effect failed");
            counter!("shortlink_side_effects_failed_total", "kind" => kind).increment(1);
        }
    }
}
