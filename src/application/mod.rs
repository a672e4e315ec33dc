//! Application layer services implementing business logic.
//!
//! This layer orchestrates domain operations by coordinating repository,
//! cache and counter-store calls. Services consume traits and provide a
//! transport-agnostic API for request handlers.
//!
//! # Available Services
//!
//! - [`services::link_service::LinkService`] - Shorten, get, update, delete
//! - [`services::redirect_resolver::RedirectResolver`] - Cache-aside resolution
//! - [`services::rate_limiter::RateLimiter`] - Fixed window, sliding window, token bucket

pub mod services;
