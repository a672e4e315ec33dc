//! URL record entity: the authoritative mapping from short code to long URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shortened URL as stored in the system of record.
///
/// A record is *resolvable* iff it is active and not past its expiry time.
/// Records are never hard-deleted by the service layer; deletion sets
/// `is_active = false` and stamps `deleted_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_code: String,
    pub original_url: String,
    pub custom_alias: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub click_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UrlRecord {
    /// Builds a freshly created, active record with zero clicks.
    pub fn from_new(new: NewUrlRecord, now: DateTime<Utc>) -> Self {
        Self {
            short_code: new.short_code,
            original_url: new.original_url,
            custom_alias: new.custom_alias,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
            is_active: true,
            click_count: 0,
            last_accessed_at: None,
            deleted_at: None,
        }
    }

    /// Returns true if the record has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| now >= e)
    }

    /// Returns true if the record has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_resolvable(&self) -> bool {
        self.is_active && !self.is_expired()
    }

    /// Returns true if `user_id` may see and mutate this record.
    ///
    /// Anonymous records are owned by anonymous callers only.
    pub fn is_owned_by(&self, user_id: Option<&str>) -> bool {
        self.user_id.as_deref() == user_id
    }

    /// Applies `patch` and bumps `updated_at`.
    pub fn apply(&mut self, patch: UrlPatch, now: DateTime<Utc>) {
        if let Some(url) = patch.original_url {
            self.original_url = url;
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

/// Input data for creating a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUrlRecord {
    pub short_code: String,
    pub original_url: String,
    pub custom_alias: Option<String>,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update for an existing record.
///
/// `None` fields are left unchanged.
/// `expires_at: Some(None)` clears the expiry; `Some(Some(t))` sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlPatch {
    pub original_url: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

impl UrlPatch {
    pub fn is_empty(&self) -> bool {
        self.original_url.is_none() && self.expires_at.is_none() && self.is_active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_record(expires_at: Option<DateTime<Utc>>) -> UrlRecord {
        UrlRecord::from_new(
            NewUrlRecord {
                short_code: "abc1234".to_string(),
                original_url: "https://example.com".to_string(),
                custom_alias: None,
                user_id: None,
                expires_at,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_from_new_defaults() {
        let record = new_record(None);
        assert!(record.is_active);
        assert_eq!(record.click_count, 0);
        assert!(record.last_accessed_at.is_none());
        assert!(!record.is_deleted());
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.is_resolvable());
    }

    #[test]
    fn test_expired_record_is_not_resolvable() {
        let record = new_record(Some(Utc::now() - Duration::seconds(1)));
        assert!(record.is_expired());
        assert!(!record.is_resolvable());
    }

    #[test]
    fn test_future_expiry_is_resolvable() {
        let record = new_record(Some(Utc::now() + Duration::hours(1)));
        assert!(!record.is_expired());
        assert!(record.is_resolvable());
    }

    #[test]
    fn test_inactive_record_is_not_resolvable() {
        let mut record = new_record(None);
        record.is_active = false;
        assert!(!record.is_resolvable());
    }

    #[test]
    fn test_ownership() {
        let mut record = new_record(None);
        assert!(record.is_owned_by(None));
        assert!(!record.is_owned_by(Some("u1")));

        record.user_id = Some("u1".to_string());
        assert!(record.is_owned_by(Some("u1")));
        assert!(!record.is_owned_by(Some("u2")));
        assert!(!record.is_owned_by(None));
    }

    #[test]
    fn test_apply_patch() {
        let mut record = new_record(Some(Utc::now() + Duration::hours(1)));
        let later = record.updated_at + Duration::seconds(5);

        record.apply(
            UrlPatch {
                original_url: Some("https://example.org".to_string()),
                expires_at: Some(None),
                is_active: None,
            },
            later,
        );

        assert_eq!(record.original_url, "https://example.org");
        assert!(record.expires_at.is_none());
        assert!(record.is_active);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_empty_patch() {
        assert!(UrlPatch::default().is_empty());
        assert!(
            !UrlPatch {
                is_active: Some(false),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
