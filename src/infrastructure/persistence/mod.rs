//! [`UrlRepository`](crate::domain::repositories::UrlRepository) implementations.
//!
//! # Repositories
//!
//! - [`PgUrlRepository`] - PostgreSQL system of record
//! - [`InMemoryUrlRepository`] - Process-local store for development and tests

pub mod memory_url_repository;
pub mod pg_url_repository;

pub use memory_url_repository::InMemoryUrlRepository;
pub use pg_url_repository::PgUrlRepository;
