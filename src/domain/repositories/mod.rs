//! Repository and collaborator trait definitions for the domain layer.
//!
//! These traits are the seams to the system of record and to analytics.
//! Implementations live in `crate::infrastructure`; mock implementations are
//! generated via `mockall` for unit tests.
//!
//! # Available Traits
//!
//! - [`UrlRepository`] - URL record CRUD, click accounting
//! - [`AnalyticsRecorder`] - Redirect analytics sink

pub mod analytics_recorder;
pub mod url_repository;

pub use analytics_recorder::AnalyticsRecorder;
pub use url_repository::UrlRepository;

#[cfg(test)]
pub use analytics_recorder::MockAnalyticsRecorder;
#[cfg(test)]
pub use url_repository::MockUrlRepository;
