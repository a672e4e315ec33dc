//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for persistence, caching and rate-limit counters.
//!
//! # Modules
//!
//! - [`cache`] - URL cache (Redis, in-process and no-op implementations)
//! - [`rate_limit`] - Counter stores for the rate limiter
//! - [`persistence`] - URL repository implementations
//! - [`analytics`] - Redirect analytics sinks
//! - [`redis_connection`] - Shared Redis connection setup

pub mod analytics;
pub mod cache;
pub mod persistence;
pub mod rate_limit;
pub mod redis_connection;
