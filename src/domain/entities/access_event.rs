//! Access event model for fire-and-forget analytics.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Client metadata attached to a redirect, as supplied by the request layer.
///
/// All fields are optional to handle missing headers gracefully.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<String>, user_agent: Option<&str>, referer: Option<&str>) -> Self {
        Self {
            ip,
            user_agent: user_agent.map(|s| s.to_string()),
            referer: referer.map(|s| s.to_string()),
        }
    }
}

/// A successful resolution, handed to the analytics recorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessEvent {
    pub short_code: String,
    pub accessed_at: DateTime<Utc>,
    pub client: ClientInfo,
}

impl AccessEvent {
    pub fn new(short_code: impl Into<String>, client: ClientInfo) -> Self {
        Self {
            short_code: short_code.into(),
            accessed_at: Utc::now(),
            client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_info_creation_full() {
        let info = ClientInfo::new(
            Some("192.168.1.1".to_string()),
            Some("Mozilla/5.0"),
            Some("https://google.com"),
        );

        assert_eq!(info.ip, Some("192.168.1.1".to_string()));
        assert_eq!(info.user_agent, Some("Mozilla/5.0".to_string()));
        assert_eq!(info.referer, Some("https://google.com".to_string()));
    }

    #[test]
    fn test_access_event_serializes() {
        let event = AccessEvent::new("abc1234", ClientInfo::default());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["short_code"], "abc1234");
        assert!(value["client"]["ip"].is_null());
    }
}
