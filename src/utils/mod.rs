//! Helpers shared by the services and the stores.
//!
//! - [`code_generator`] - Base62 encoding, short code generation and validation
//! - [`url_validation`] - Original-URL checks
//! - [`rate_limit_key`] - Rate-limit identities and IP normalization
//! - [`deadline`] - Timeouts around remote calls

pub mod code_generator;
pub mod deadline;
pub mod rate_limit_key;
pub mod url_validation;
