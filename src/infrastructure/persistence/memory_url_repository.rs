//! In-memory implementation of the URL repository.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;

use crate::domain::entities::{NewUrlRecord, UrlRecord};
use crate::domain::repositories::UrlRepository;
use crate::error::AppError;

/// [`UrlRepository`] backed by a [`DashMap`].
///
/// Mirrors the PostgreSQL semantics: short codes stay taken after a soft
/// delete, and deleted records are invisible to every lookup.
#[derive(Debug, Default)]
pub struct InMemoryUrlRepository {
    storage: DashMap<String, UrlRecord>,
}

impl InMemoryUrlRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

fn not_found(code: &str) -> AppError {
    AppError::not_found("Short URL not found", json!({ "code": code }))
}

#[async_trait]
impl UrlRepository for InMemoryUrlRepository {
    async fn create(&self, new_record: NewUrlRecord) -> Result<UrlRecord, AppError> {
        match self.storage.entry(new_record.short_code.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(
                "Short code already exists",
                json!({ "code": new_record.short_code }),
            )),
            Entry::Vacant(slot) => {
                let record = UrlRecord::from_new(new_record, Utc::now());
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get_by_short_code(&self, code: &str) -> Result<Option<UrlRecord>, AppError> {
        Ok(self
            .storage
            .get(code)
            .filter(|r| !r.is_deleted())
            .map(|r| r.clone()))
    }

    async fn get_by_original_url(
        &self,
        original_url: &str,
        user_id: Option<String>,
    ) -> Result<Option<UrlRecord>, AppError> {
        Ok(self
            .storage
            .iter()
            .filter(|r| {
                !r.is_deleted()
                    && r.original_url == original_url
                    && r.is_owned_by(user_id.as_deref())
            })
            .max_by_key(|r| r.created_at)
            .map(|r| r.clone()))
    }

    async fn update(&self, record: &UrlRecord) -> Result<UrlRecord, AppError> {
        let mut stored = self
            .storage
            .get_mut(&record.short_code)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| not_found(&record.short_code))?;

        stored.original_url.clone_from(&record.original_url);
        stored.expires_at = record.expires_at;
        stored.is_active = record.is_active;
        stored.updated_at = record.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, code: &str, user_id: Option<String>) -> Result<(), AppError> {
        let mut stored = self
            .storage
            .get_mut(code)
            .filter(|r| !r.is_deleted() && r.is_owned_by(user_id.as_deref()))
            .ok_or_else(|| not_found(code))?;

        let now = Utc::now();
        stored.is_active = false;
        stored.deleted_at = Some(now);
        stored.updated_at = now;
        Ok(())
    }

    async fn increment_click_count(&self, code: &str) -> Result<(), AppError> {
        let mut stored = self
            .storage
            .get_mut(code)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| not_found(code))?;
        stored.click_count += 1;
        Ok(())
    }

    async fn update_last_accessed(&self, code: &str) -> Result<(), AppError> {
        let mut stored = self
            .storage
            .get_mut(code)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| not_found(code))?;
        stored.last_accessed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_record(code: &str, url: &str, user: Option<&str>) -> NewUrlRecord {
        NewUrlRecord {
            short_code: code.to_string(),
            original_url: url.to_string(),
            custom_alias: None,
            user_id: user.map(str::to_string),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryUrlRepository::new();

        let created = repo
            .create(new_record("abc1234", "https://example.com", None))
            .await
            .unwrap();
        assert!(created.is_active);

        let found = repo.get_by_short_code("abc1234").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(repo.get_by_short_code("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let repo = InMemoryUrlRepository::new();
        repo.create(new_record("abc1234", "https://a.com", None))
            .await
            .unwrap();

        let err = repo
            .create(new_record("abc1234", "https://b.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_get_by_original_url_matches_owner() {
        let repo = InMemoryUrlRepository::new();
        repo.create(new_record("anon0001", "https://example.com", None))
            .await
            .unwrap();
        repo.create(new_record("user0001", "https://example.com", Some("u1")))
            .await
            .unwrap();

        let anon = repo
            .get_by_original_url("https://example.com", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anon.short_code, "anon0001");

        let owned = repo
            .get_by_original_url("https://example.com", Some("u1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owned.short_code, "user0001");

        assert!(
            repo.get_by_original_url("https://example.com", Some("u2".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_hides_record_but_keeps_code_taken() {
        let repo = InMemoryUrlRepository::new();
        repo.create(new_record("abc1234", "https://example.com", Some("u1")))
            .await
            .unwrap();

        let err = repo.delete("abc1234", Some("u2".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        repo.delete("abc1234", Some("u1".into())).await.unwrap();
        assert!(repo.get_by_short_code("abc1234").await.unwrap().is_none());
        assert!(
            repo.get_by_original_url("https://example.com", Some("u1".into()))
                .await
                .unwrap()
                .is_none()
        );

        let err = repo
            .create(new_record("abc1234", "https://other.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));

        let err = repo.delete("abc1234", Some("u1".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_persists_mutable_fields() {
        let repo = InMemoryUrlRepository::new();
        let mut record = repo
            .create(new_record("abc1234", "https://old.com", None))
            .await
            .unwrap();

        record.original_url = "https://new.com".into();
        record.is_active = false;
        record.click_count = 999;
        let updated = repo.update(&record).await.unwrap();

        assert_eq!(updated.original_url, "https://new.com");
        assert!(!updated.is_active);
        assert_eq!(updated.click_count, 0);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = InMemoryUrlRepository::new();
        let record = UrlRecord::from_new(new_record("ghost01", "https://x.com", None), Utc::now());

        let err = repo.update(&record).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_click_accounting() {
        let repo = Arc::new(InMemoryUrlRepository::new());
        repo.create(new_record("abc1234", "https://example.com", None))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.increment_click_count("abc1234").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        repo.update_last_accessed("abc1234").await.unwrap();

        let record = repo.get_by_short_code("abc1234").await.unwrap().unwrap();
        assert_eq!(record.click_count, 20);
        assert!(record.last_accessed_at.is_some());

        assert!(repo.increment_click_count("missing").await.is_err());
    }
}
