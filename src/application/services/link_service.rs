//! Short link creation and management service.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::domain::entities::{NewUrlRecord, UrlPatch, UrlRecord};
use crate::domain::repositories::UrlRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;
use crate::utils::code_generator::{
    CodeGenerator, GenerationMode, MAX_GENERATION_ATTEMPTS, validate_custom_alias,
    validate_short_code,
};
use crate::utils::deadline::{with_deadline, with_write_deadline};
use crate::utils::url_validation::validate_original_url;

static CUSTOM_ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Request to shorten a URL.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ShortenRequest {
    #[validate(length(min = 1, max = 2048, message = "URL must be 1-2048 characters"))]
    pub original_url: String,

    #[validate(length(min = 3, max = 50))]
    #[validate(regex(path = "*CUSTOM_ALIAS_REGEX"))]
    pub custom_alias: Option<String>,

    /// Lifetime in seconds from creation.
    #[validate(range(min = 1))]
    pub expires_in_seconds: Option<i64>,

    pub user_id: Option<String>,
}

impl ShortenRequest {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.custom_alias = Some(alias.into());
        self
    }

    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.expires_in_seconds = Some(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX));
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Result of a shorten call.
#[derive(Debug, Clone, Serialize)]
pub struct ShortenedUrl {
    pub record: UrlRecord,
    pub short_url: String,
    /// `false` when an existing record was returned.
    pub created: bool,
}

/// Tunables for [`LinkService`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub base_url: String,
    pub code_length: usize,
    pub cache_ttl: Duration,
    pub remote_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            code_length: 8,
            cache_ttl: Duration::from_secs(3600),
            remote_timeout: Duration::from_millis(500),
        }
    }
}

/// Service for creating and managing shortened URLs.
///
/// Mutations invalidate the cache before returning, so a read issued after
/// `update` or `delete` completes never sees the previous value.
pub struct LinkService<R: UrlRepository> {
    repository: Arc<R>,
    cache: Arc<dyn CacheService>,
    generator: CodeGenerator,
    settings: LinkSettings,
}

impl<R: UrlRepository> LinkService<R> {
    pub fn new(repository: Arc<R>, cache: Arc<dyn CacheService>, settings: LinkSettings) -> Self {
        Self {
            repository,
            cache,
            generator: CodeGenerator::new(GenerationMode::CollisionRetry, settings.code_length),
            settings,
        }
    }

    /// Shortens a URL.
    ///
    /// # Idempotency
    ///
    /// If a resolvable record for the same URL and owner exists and its
    /// custom alias matches the request (both absent or equal), that record
    /// is returned unchanged.
    ///
    /// # Code Generation
    ///
    /// - With a custom alias, the alias is the short code
    /// - Otherwise the first attempt is derived from the URL hash, then
    ///   salted hashes, then random codes, up to
    ///   [`MAX_GENERATION_ATTEMPTS`] attempts
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] for a malformed URL, alias or expiry
    /// - [`AppError::Conflict`] if the alias is taken, or an existing record
    ///   for the URL was created with a different alias intent
    /// - [`AppError::Internal`] if no free code is found
    pub async fn shorten(&self, request: ShortenRequest) -> Result<ShortenedUrl, AppError> {
        request.validate()?;

        let original_url = validate_original_url(&request.original_url).map_err(|e| {
            AppError::bad_request("Invalid URL format", json!({ "reason": e.to_string() }))
        })?;

        if let Some(alias) = &request.custom_alias {
            validate_custom_alias(alias)?;
        }

        if let Some(existing) = self
            .with_deadline(
                "get_by_original_url",
                self.repository
                    .get_by_original_url(&original_url, request.user_id.clone()),
            )
            .await?
            .filter(UrlRecord::is_resolvable)
        {
            if existing.custom_alias != request.custom_alias {
                return Err(AppError::conflict(
                    "URL already shortened with a different alias",
                    json!({
                        "existing_code": existing.short_code,
                        "requested_alias": request.custom_alias,
                    }),
                ));
            }

            debug!(code = %existing.short_code, "Returning existing short URL");
            return Ok(self.shortened(existing, false));
        }

        let expires_at = request
            .expires_in_seconds
            .map(|secs| {
                chrono::Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        AppError::bad_request(
                            "Expiry is too far in the future",
                            json!({ "expires_in_seconds": secs }),
                        )
                    })
            })
            .transpose()?;

        let record = match request.custom_alias {
            Some(alias) => {
                self.create_with_alias(alias, original_url, request.user_id, expires_at)
                    .await?
            }
            None => {
                self.create_with_generated_code(original_url, request.user_id, expires_at)
                    .await?
            }
        };

        if let Err(e) = self
            .cache
            .set_url(
                &record.short_code,
                &record.original_url,
                Some(self.settings.cache_ttl),
            )
            .await
        {
            warn!(code = %record.short_code, error = %e, "Failed to warm cache");
        }

        info!(code = %record.short_code, "Short URL created");
        Ok(self.shortened(record, true))
    }

    async fn create_with_alias(
        &self,
        alias: String,
        original_url: String,
        user_id: Option<String>,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<UrlRecord, AppError> {
        if self
            .with_deadline(
                "get_by_short_code",
                self.repository.get_by_short_code(&alias),
            )
            .await?
            .is_some()
        {
            return Err(AppError::conflict(
                "Custom alias already exists",
                json!({ "alias": alias }),
            ));
        }

        let new_record = NewUrlRecord {
            short_code: alias.clone(),
            original_url,
            custom_alias: Some(alias),
            user_id,
            expires_at,
        };

        self.with_write_deadline("create", self.repository.create(new_record))
            .await
    }

    async fn create_with_generated_code(
        &self,
        original_url: String,
        user_id: Option<String>,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<UrlRecord, AppError> {
        for attempt in 0..MAX_GENERATION_ATTEMPTS {
            let code = self.generator.generate(&original_url, attempt);

            if self
                .with_deadline(
                    "get_by_short_code",
                    self.repository.get_by_short_code(&code),
                )
                .await?
                .is_some()
            {
                debug!(code = %code, attempt, "Short code collision");
                continue;
            }

            let new_record = NewUrlRecord {
                short_code: code.clone(),
                original_url: original_url.clone(),
                custom_alias: None,
                user_id: user_id.clone(),
                expires_at,
            };

            // Codes of soft-deleted records are invisible to lookups but still taken.
            match self
                .with_write_deadline("create", self.repository.create(new_record))
                .await
            {
                Ok(record) => return Ok(record),
                Err(AppError::Conflict { .. }) => {
                    debug!(code = %code, attempt, "Short code taken on insert");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::internal(
            "Failed to generate unique short code",
            json!({ "attempts": MAX_GENERATION_ATTEMPTS }),
        ))
    }

    /// Returns the authoritative record for `code`.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidShortCode`] for a malformed code
    /// - [`AppError::NotFound`] if no live record exists
    pub async fn get(&self, code: &str) -> Result<UrlRecord, AppError> {
        validate_short_code(code)?;

        self.with_deadline("get_by_short_code", self.repository.get_by_short_code(code))
            .await?
            .ok_or_else(|| not_found(code))
    }

    /// Applies `patch` to a record owned by `user_id`.
    ///
    /// The cache entry is invalidated before this returns. A record owned by
    /// someone else is reported as not found.
    pub async fn update(
        &self,
        code: &str,
        patch: UrlPatch,
        user_id: Option<&str>,
    ) -> Result<UrlRecord, AppError> {
        validate_short_code(code)?;

        if patch.is_empty() {
            return Err(AppError::bad_request(
                "No fields to update",
                json!({ "code": code }),
            ));
        }

        if let Some(url) = &patch.original_url {
            validate_original_url(url).map_err(|e| {
                AppError::bad_request("Invalid URL format", json!({ "reason": e.to_string() }))
            })?;
        }

        let mut record = self
            .with_deadline("get_by_short_code", self.repository.get_by_short_code(code))
            .await?
            .filter(|r| r.is_owned_by(user_id))
            .ok_or_else(|| not_found(code))?;

        record.apply(patch, Utc::now());

        let updated = self
            .with_write_deadline("update", self.repository.update(&record))
            .await;

        // Invalidate even when the outcome is unknown.
        self.invalidate(code).await;
        let updated = updated?;

        info!(code = %code, "Short URL updated");
        Ok(updated)
    }

    /// Soft-deletes a record owned by `user_id` and invalidates its cache entry.
    pub async fn delete(&self, code: &str, user_id: Option<&str>) -> Result<(), AppError> {
        validate_short_code(code)?;

        let deleted = self
            .with_write_deadline(
                "delete",
                self.repository.delete(code, user_id.map(str::to_owned)),
            )
            .await;

        self.invalidate(code).await;
        deleted?;

        info!(code = %code, "Short URL deleted");
        Ok(())
    }

    /// Builds the public short URL for `code`.
    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), code)
    }

    fn shortened(&self, record: UrlRecord, created: bool) -> ShortenedUrl {
        ShortenedUrl {
            short_url: self.short_url(&record.short_code),
            record,
            created,
        }
    }

    async fn invalidate(&self, code: &str) {
        // Readers re-validate against the repository, so a failed
        // invalidation is repaired on the next hit.
        if let Err(e) = self.cache.invalidate(code).await {
            warn!(code = %code, error = %e, "Cache invalidation failed");
        }
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        with_deadline(operation, self.settings.remote_timeout, fut).await
    }

    async fn with_write_deadline<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        with_write_deadline(operation, self.settings.remote_timeout, fut).await
    }
}

fn not_found(code: &str) -> AppError {
    AppError::not_found("Short URL not found", json!({ "code": code }))
}
