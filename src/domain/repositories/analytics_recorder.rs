//! Sink for redirect analytics.

use crate::domain::entities::AccessEvent;
use crate::error::AppError;
use async_trait::async_trait;

/// Fire-and-forget recorder of successful redirects.
///
/// Called from the background side-effect worker only; failures are logged
/// and never reach the redirect caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsRecorder: Send + Sync {
    async fn record_access(&self, event: AccessEvent) -> Result<(), AppError>;
}
