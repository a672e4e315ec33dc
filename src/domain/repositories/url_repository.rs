//! Repository trait for the URL system of record.

use crate::domain::entities::{NewUrlRecord, UrlRecord};
use crate::error::AppError;
use async_trait::async_trait;

/// Durable store of [`UrlRecord`]s.
///
/// Lookups never return soft-deleted records. Expiry and activity are *not*
/// filtered here; callers decide how to treat them.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgUrlRepository`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::InMemoryUrlRepository`] - In-process implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlRepository: Send + Sync {
    /// Creates a new record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the short code (or alias) already exists.
    async fn create(&self, new_record: NewUrlRecord) -> Result<UrlRecord, AppError>;

    /// Finds a non-deleted record by short code.
    async fn get_by_short_code(&self, code: &str) -> Result<Option<UrlRecord>, AppError>;

    /// Finds the most recent non-deleted record for `original_url` owned by
    /// `user_id` (`None` matches anonymous records only).
    async fn get_by_original_url(
        &self,
        original_url: &str,
        user_id: Option<String>,
    ) -> Result<Option<UrlRecord>, AppError>;

    /// Persists the mutable fields of `record`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no live record has this short code.
    async fn update(&self, record: &UrlRecord) -> Result<UrlRecord, AppError>;

    /// Soft-deletes the record owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no live record matches code and owner.
    async fn delete(&self, code: &str, user_id: Option<String>) -> Result<(), AppError>;

    async fn increment_click_count(&self, code: &str) -> Result<(), AppError>;

    async fn update_last_accessed(&self, code: &str) -> Result<(), AppError>;
}
