//! Rate-limit key scheme and client IP normalization.
//!
//! Keys are colon-joined segments such as `ip:<addr>`, `user:<id>` or
//! `endpoint:<method>:ip:<addr>`. IP parsing never fails a request: input that
//! is not a recognizable address is used verbatim.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Normalizes a client address for use in a rate-limit key.
///
/// - Surrounding whitespace is trimmed
/// - A socket address (`1.2.3.4:5678`, `[::1]:80`) is reduced to its IP
/// - IPv4-mapped IPv6 (`::ffff:10.0.0.1`) is rendered as dotted quad
/// - Other addresses use their canonical textual form
/// - Unparseable input is returned unchanged
///
/// # Examples
///
/// ```
/// use shortlink::utils::rate_limit_key::normalize_ip;
///
/// assert_eq!(normalize_ip("::ffff:192.168.1.1"), "192.168.1.1");
/// assert_eq!(normalize_ip("not-an-ip"), "not-an-ip");
/// ```
pub fn normalize_ip(raw: &str) -> String {
    let trimmed = raw.trim();

    let parsed = trimmed
        .parse::<IpAddr>()
        .ok()
        .or_else(|| trimmed.parse::<SocketAddr>().ok().map(|s| s.ip()));

    match parsed {
        Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Some(IpAddr::V4(v4)) => v4.to_string(),
        None => raw.to_string(),
    }
}

/// A caller identity to rate limit on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitKey {
    Ip(String),
    User(String),
    Endpoint { method: String, ip: String },
    Composite(Vec<String>),
}

impl RateLimitKey {
    pub fn ip(addr: &str) -> Self {
        Self::Ip(normalize_ip(addr))
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn endpoint(method: impl Into<String>, addr: &str) -> Self {
        Self::Endpoint {
            method: method.into(),
            ip: normalize_ip(addr),
        }
    }

    pub fn composite<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Composite(segments.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::Ip(ip) => write!(f, "ip:{ip}"),
            RateLimitKey::User(id) => write!(f, "user:{id}"),
            RateLimitKey::Endpoint { method, ip } => write!(f, "endpoint:{method}:ip:{ip}"),
            RateLimitKey::Composite(segments) => f.write_str(&segments.join(":")),
        }
    }
}
