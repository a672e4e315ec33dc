//! Analytics sinks.
//!
//! Aggregation and persistence of analytics belong to a separate system;
//! these sinks emit events to the log stream or drop them.

use async_trait::async_trait;
use tracing::info;

use crate::domain::entities::AccessEvent;
use crate::domain::repositories::AnalyticsRecorder;
use crate::error::AppError;

/// Emits each access as a structured `tracing` event on the `analytics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

#[async_trait]
impl AnalyticsRecorder for TracingAnalytics {
    async fn record_access(&self, event: AccessEvent) -> Result<(), AppError> {
        info!(
            target: "analytics",
            code = %event.short_code,
            accessed_at = %event.accessed_at,
            ip = event.client.ip.as_deref().unwrap_or("-"),
            user_agent = event.client.user_agent.as_deref().unwrap_or("-"),
            referer = event.client.referer.as_deref().unwrap_or("-"),
            "redirect"
        );
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnalytics;

#[async_trait]
impl AnalyticsRecorder for NullAnalytics {
    async fn record_access(&self, _event: AccessEvent) -> Result<(), AppError> {
        Ok(())
    }
}
