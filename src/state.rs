//! Shared service state handed to request handlers and the admin CLI.

use std::sync::Arc;

use crate::application::services::{LinkService, RateLimiter, RedirectResolver};
use crate::domain::repositories::UrlRepository;
use crate::domain::side_effects::SideEffectQueue;
use crate::infrastructure::cache::CacheService;

/// Wired services, generic over the system of record.
///
/// Cloning is cheap. Every clone holds a [`SideEffectQueue`] handle, so the
/// side-effect worker keeps running until the last clone is dropped.
pub struct AppState<R: UrlRepository> {
    pub repository: Arc<R>,
    pub cache: Arc<dyn CacheService>,
    pub links: Arc<LinkService<R>>,
    pub resolver: Arc<RedirectResolver<R>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub side_effects: SideEffectQueue,
}

// Manual impl: a derive would require `R: Clone`.
impl<R: UrlRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: Arc::clone(&self.cache),
            links: Arc::clone(&self.links),
            resolver: Arc::clone(&self.resolver),
            rate_limiter: Arc::clone(&self.rate_limiter),
            side_effects: self.side_effects.clone(),
        }
    }
}
