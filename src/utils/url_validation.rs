//! Validation of original (long) URLs before they are shortened.
//!
//! The URL is parsed to reject malformed or dangerous input, but the stored
//! value is the caller's string unchanged so that idempotent lookups by
//! original URL match exactly what was submitted.

use url::Url;

/// Upper bound on stored URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Errors that can occur while validating an original URL.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("URL must not be empty")]
    Empty,

    #[error("URL exceeds {MAX_URL_LENGTH} bytes")]
    TooLong,

    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("URL must contain a host")]
    MissingHost,
}

/// Validates `input` as an absolute HTTP(S) URL and returns it trimmed.
///
/// # Security
///
/// Rejects potentially dangerous protocols like `javascript:`, `data:`, `file:`, etc.
///
/// # Examples
///
/// ```
/// use shortlink::utils::url_validation::validate_original_url;
///
/// assert_eq!(
///     validate_original_url(" https://example.com ").unwrap(),
///     "https://example.com"
/// );
/// assert!(validate_original_url("javascript:alert(1)").is_err());
/// ```
pub fn validate_original_url(input: &str) -> Result<String, UrlValidationError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    if trimmed.len() > MAX_URL_LENGTH {
        return Err(UrlValidationError::TooLong);
    }

    let url = Url::parse(trimmed).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlValidationError::UnsupportedProtocol),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(trimmed.to_string())
}
