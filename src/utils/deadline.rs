//! Deadline enforcement for system-of-record calls.

use std::future::Future;
use std::time::Duration;

use serde_json::json;

use crate::error::AppError;

/// Runs a read under `timeout`.
///
/// An elapsed deadline becomes a retryable [`AppError::Unavailable`].
pub async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Repository call timed out"
            );
            Err(AppError::unavailable(
                "Storage operation timed out",
                json!({ "operation": operation, "timeout_ms": timeout.as_millis() as u64 }),
            ))
        }
    }
}

/// Runs a write under `timeout`.
///
/// The write may have been applied when the deadline elapses, so the error
/// is not retryable.
pub async fn with_write_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Repository write timed out, outcome unknown"
            );
            Err(AppError::outcome_unknown(
                "Storage write timed out; it may or may not have been applied",
                json!({ "operation": operation, "timeout_ms": timeout.as_millis() as u64 }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result =
            with_deadline("get", Duration::from_secs(1), async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_propagates_inner_error() {
        let result: Result<(), _> = with_deadline("get", Duration::from_secs(1), async {
            Err(AppError::not_found("missing", json!({})))
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_read_deadline_is_retryable() {
        let result: Result<(), _> =
            with_deadline("get_by_short_code", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Unavailable { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.details()["operation"], "get_by_short_code");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_write_deadline_is_not_retryable() {
        let result: Result<(), _> =
            with_write_deadline("create", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Unavailable { .. }));
        assert!(!err.is_retryable());
        assert_eq!(err.details()["operation"], "create");
    }

    #[tokio::test]
    async fn test_write_within_deadline() {
        let result = with_write_deadline("update", Duration::from_secs(1), async {
            Ok::<_, AppError>("saved")
        })
        .await;
        assert_eq!(result.unwrap(), "saved");
    }
}
