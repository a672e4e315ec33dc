//! PostgreSQL implementation of the URL repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;

use crate::domain::entities::{NewUrlRecord, UrlRecord};
use crate::domain::repositories::UrlRepository;
use crate::error::AppError;

const URL_COLUMNS: &str = "short_code, original_url, custom_alias, user_id, created_at, \
     updated_at, expires_at, is_active, click_count, last_accessed_at, deleted_at";

#[derive(Debug, FromRow)]
struct UrlRow {
    short_code: String,
    original_url: String,
    custom_alias: Option<String>,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    click_count: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UrlRow> for UrlRecord {
    fn from(r: UrlRow) -> Self {
        Self {
            short_code: r.short_code,
            original_url: r.original_url,
            custom_alias: r.custom_alias,
            user_id: r.user_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            expires_at: r.expires_at,
            is_active: r.is_active,
            click_count: r.click_count,
            last_accessed_at: r.last_accessed_at,
            deleted_at: r.deleted_at,
        }
    }
}

/// PostgreSQL repository for URL records.
///
/// Queries are checked at runtime so the crate builds without a database;
/// the schema lives in `migrations/`.
pub struct PgUrlRepository {
    pool: Arc<PgPool>,
}

impl PgUrlRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn not_found(code: &str) -> AppError {
    AppError::not_found("Short URL not found", json!({ "code": code }))
}

#[async_trait]
impl UrlRepository for PgUrlRepository {
    async fn create(&self, new_record: NewUrlRecord) -> Result<UrlRecord, AppError> {
        let row = sqlx::query_as::<_, UrlRow>(&format!(
            r#"
            INSERT INTO urls (short_code, original_url, custom_alias, user_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {URL_COLUMNS}
            "#
        ))
        .bind(&new_record.short_code)
        .bind(&new_record.original_url)
        .bind(&new_record.custom_alias)
        .bind(&new_record.user_id)
        .bind(new_record.expires_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get_by_short_code(&self, code: &str) -> Result<Option<UrlRecord>, AppError> {
        let row = sqlx::query_as::<_, UrlRow>(&format!(
            r#"
            SELECT {URL_COLUMNS}
            FROM urls
            WHERE short_code = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_original_url(
        &self,
        original_url: &str,
        user_id: Option<String>,
    ) -> Result<Option<UrlRecord>, AppError> {
        let row = sqlx::query_as::<_, UrlRow>(&format!(
            r#"
            SELECT {URL_COLUMNS}
            FROM urls
            WHERE original_url = $1
              AND user_id IS NOT DISTINCT FROM $2
              AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(original_url)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update(&self, record: &UrlRecord) -> Result<UrlRecord, AppError> {
        let row = sqlx::query_as::<_, UrlRow>(&format!(
            r#"
            UPDATE urls
            SET original_url = $2, expires_at = $3, is_active = $4, updated_at = $5
            WHERE short_code = $1 AND deleted_at IS NULL
            RETURNING {URL_COLUMNS}
            "#
        ))
        .bind(&record.short_code)
        .bind(&record.original_url)
        .bind(record.expires_at)
        .bind(record.is_active)
        .bind(record.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Into::into)
            .ok_or_else(|| not_found(&record.short_code))
    }

    async fn delete(&self, code: &str, user_id: Option<String>) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE urls
            SET is_active = FALSE, deleted_at = NOW(), updated_at = NOW()
            WHERE short_code = $1
              AND user_id IS NOT DISTINCT FROM $2
              AND deleted_at IS NULL
            "#,
        )
        .bind(code)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(code));
        }
        Ok(())
    }

    async fn increment_click_count(&self, code: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE urls SET click_count = click_count + 1 WHERE short_code = $1 AND deleted_at IS NULL",
        )
        .bind(code)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(code));
        }
        Ok(())
    }

    async fn update_last_accessed(&self, code: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE urls SET last_accessed_at = NOW() WHERE short_code = $1 AND deleted_at IS NULL",
        )
        .bind(code)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(code));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn live_repo() -> PgUrlRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("postgres available");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations apply");
        PgUrlRepository::new(Arc::new(pool))
    }

    fn unique_code() -> String {
        use rand::Rng;
        format!("pg{:06}", rand::rng().random_range(0..1_000_000))
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_create_get_delete() {
        let repo = live_repo().await;
        let code = unique_code();

        let created = repo
            .create(NewUrlRecord {
                short_code: code.clone(),
                original_url: "https://example.com/pg".into(),
                custom_alias: None,
                user_id: Some("u1".into()),
                expires_at: None,
            })
            .await
            .unwrap();
        assert!(created.is_active);
        assert_eq!(created.click_count, 0);

        let found = repo
            .get_by_original_url("https://example.com/pg", Some("u1".into()))
            .await
            .unwrap();
        assert!(found.is_some());

        repo.increment_click_count(&code).await.unwrap();
        let fetched = repo.get_by_short_code(&code).await.unwrap().unwrap();
        assert_eq!(fetched.click_count, 1);

        let err = repo.delete(&code, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        repo.delete(&code, Some("u1".into())).await.unwrap();
        assert!(repo.get_by_short_code(&code).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_duplicate_code_is_conflict() {
        let repo = live_repo().await;
        let code = unique_code();
        let new = || NewUrlRecord {
            short_code: code.clone(),
            original_url: "https://example.com/dup".into(),
            custom_alias: None,
            user_id: None,
            expires_at: None,
        };

        repo.create(new()).await.unwrap();
        let err = repo.create(new()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }
}
