//! Business logic services for the application layer.

pub mod link_service;
pub mod rate_limiter;
pub mod redirect_resolver;

pub use link_service::{LinkService, LinkSettings, ShortenRequest, ShortenedUrl};
pub use rate_limiter::{
    FailurePolicy, RateLimitAlgorithm, RateLimitConfig, RateLimitDecision, RateLimitInfo,
    RateLimiter,
};
pub use redirect_resolver::RedirectResolver;
