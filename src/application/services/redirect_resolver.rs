//! Short code resolution for redirects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::entities::{AccessEvent, ClientInfo, UrlRecord};
use crate::domain::repositories::UrlRepository;
use crate::domain::side_effects::{SideEffect, SideEffectQueue};
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;
use crate::utils::code_generator::validate_short_code;
use crate::utils::deadline::with_deadline;

/// Resolves short codes to redirect targets, cache first.
///
/// The cache holds only the URL string, so every request is re-validated
/// against the repository: a cached URL is never served for a record that
/// is missing, expired or inactive. Click accounting, analytics and
/// opportunistic invalidation run on the [`SideEffectQueue`] after the
/// answer is known and never affect it.
pub struct RedirectResolver<R: UrlRepository> {
    repository: Arc<R>,
    cache: Arc<dyn CacheService>,
    side_effects: SideEffectQueue,
    cache_ttl: Duration,
    remote_timeout: Duration,
}

impl<R: UrlRepository> RedirectResolver<R> {
    pub fn new(
        repository: Arc<R>,
        cache: Arc<dyn CacheService>,
        side_effects: SideEffectQueue,
        cache_ttl: Duration,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            side_effects,
            cache_ttl,
            remote_timeout,
        }
    }

    /// Returns the original URL for `code`.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidShortCode`] for a malformed code (no store access)
    /// - [`AppError::NotFound`] if no live record exists
    /// - [`AppError::Expired`] if the record is past its expiry
    /// - [`AppError::Inactive`] if the record has been deactivated
    /// - Repository errors are propagated unchanged in kind
    pub async fn resolve(&self, code: &str, client: Option<ClientInfo>) -> Result<String, AppError> {
        let result = self.resolve_inner(code, client).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        counter!("shortlink_redirects_total", "outcome" => outcome).increment(1);

        result
    }

    async fn resolve_inner(
        &self,
        code: &str,
        client: Option<ClientInfo>,
    ) -> Result<String, AppError> {
        validate_short_code(code)?;

        let cached = self.lookup_cache(code).await;

        let record = with_deadline(
            "get_by_short_code",
            self.remote_timeout,
            self.repository.get_by_short_code(code),
        )
        .await?;

        let record = match self.check_resolvable(code, record) {
            Ok(record) => record,
            Err(e) => {
                if cached.is_some() {
                    self.side_effects.dispatch(SideEffect::InvalidateCache {
                        code: code.to_owned(),
                    });
                }
                return Err(e);
            }
        };

        let url = match cached {
            Some(cached_url) if cached_url == record.original_url => cached_url,
            Some(_) => {
                warn!(code = %code, "Cached URL differs from record, repairing cache");
                self.populate_cache(&record).await;
                record.original_url
            }
            None => {
                self.populate_cache(&record).await;
                record.original_url
            }
        };

        self.record_access(code, client.unwrap_or_default());
        Ok(url)
    }

    fn check_resolvable(
        &self,
        code: &str,
        record: Option<UrlRecord>,
    ) -> Result<UrlRecord, AppError> {
        let Some(record) = record else {
            return Err(AppError::not_found(
                "Short URL not found",
                json!({ "code": code }),
            ));
        };

        if record.is_expired() {
            return Err(AppError::expired(
                "Short URL has expired",
                json!({ "code": code, "expired_at": record.expires_at }),
            ));
        }

        if !record.is_active {
            return Err(AppError::inactive(
                "Short URL is inactive",
                json!({ "code": code }),
            ));
        }

        Ok(record)
    }

    /// Cache errors count as a miss.
    async fn lookup_cache(&self, code: &str) -> Option<String> {
        match self.cache.get_url(code).await {
            Ok(Some(url)) => {
                counter!("shortlink_cache_lookups_total", "result" => "hit").increment(1);
                Some(url)
            }
            Ok(None) => {
                counter!("shortlink_cache_lookups_total", "result" => "miss").increment(1);
                None
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Cache lookup failed, falling back to repository");
                counter!("shortlink_cache_lookups_total", "result" => "error").increment(1);
                None
            }
        }
    }

    /// Writes the record's URL with a TTL no longer than its remaining lifetime.
    async fn populate_cache(&self, record: &UrlRecord) {
        let ttl = record
            .expires_at
            .and_then(|at| (at - Utc::now()).to_std().ok())
            .map_or(self.cache_ttl, |remaining| remaining.min(self.cache_ttl));

        if let Err(e) = self
            .cache
            .set_url(&record.short_code, &record.original_url, Some(ttl))
            .await
        {
            warn!(code = %record.short_code, error = %e, "Failed to populate cache");
        } else {
            debug!(code = %record.short_code, ttl_secs = ttl.as_secs(), "Cache populated");
        }
    }

    fn record_access(&self, code: &str, client: ClientInfo) {
        self.side_effects.dispatch(SideEffect::IncrementClickCount {
            code: code.to_owned(),
        });
        self.side_effects.dispatch(SideEffect::TouchLastAccessed {
            code: code.to_owned(),
        });
        self.side_effects
            .dispatch(SideEffect::RecordAccess(AccessEvent::new(code, client)));
    }
}
