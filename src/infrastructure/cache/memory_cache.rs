//! In-process cache implementation.

use super::service::{CacheResult, CacheService};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// TTL-aware cache backed by a [`DashMap`].
///
/// Expired entries are evicted lazily on read. Suitable for a single process;
/// entries are not shared between instances.
#[derive(Debug)]
pub struct MemoryCache {
    storage: DashMap<String, Entry>,
    default_ttl: Duration,
}

impl MemoryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            storage: DashMap::new(),
            default_ttl,
        }
    }

    /// Number of stored entries, including not-yet-evicted expired ones.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get_url(&self, short_code: &str) -> CacheResult<Option<String>> {
        let Some(entry) = self.storage.get(short_code) else {
            return Ok(None);
        };

        if entry.is_expired() {
            drop(entry);
            self.storage
                .remove_if(short_code, |_, entry| entry.is_expired());
            return Ok(None);
        }

        Ok(Some(entry.original_url.clone()))
    }

    async fn set_url(
        &self,
        short_code: &str,
        original_url: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let entry = Entry {
            original_url: original_url.to_owned(),
            expires_at: Instant::now() + ttl.unwrap_or(self.default_ttl),
        };
        self.storage.insert(short_code.to_owned(), entry);
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        self.storage.remove(short_code);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
