//! Core domain entities.
//!
//! # Entity Types
//!
//! - [`UrlRecord`] - The authoritative short code to URL mapping
//! - [`AccessEvent`] / [`ClientInfo`] - A successful redirect, for analytics
//!
//! Creation and mutation use separate structs: [`NewUrlRecord`] and [`UrlPatch`].

pub mod access_event;
pub mod url_record;

pub use access_event::{AccessEvent, ClientInfo};
pub use url_record::{NewUrlRecord, UrlPatch, UrlRecord};
