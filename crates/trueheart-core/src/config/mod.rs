//! Sync engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Application id used to key the remote blob when none is configured.
pub const DEFAULT_APP_ID: &str = "trueheart";
/// Quiet period after the last local change before a sync starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
/// Tombstones older than this are dropped before merging.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Page size for remote deletion event fetches.
pub const DEFAULT_EVENT_PAGE_LIMIT: usize = 500;

/// Configuration for the sync engine and its remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote store (e.g. `https://api.example.com`)
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Application id the remote blob is keyed by
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default = "default_debounce", with = "duration_millis")]
    pub debounce: Duration,
    #[serde(default = "default_retention", with = "duration_millis")]
    pub retention: Duration,
    #[serde(default = "default_event_page_limit")]
    pub event_page_limit: usize,
    /// Optional request timeout; when unset the transport default applies
    #[serde(default, with = "optional_duration_millis")]
    pub http_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            app_id: default_app_id(),
            debounce: DEFAULT_DEBOUNCE,
            retention: DEFAULT_RETENTION,
            event_page_limit: DEFAULT_EVENT_PAGE_LIMIT,
            http_timeout: None,
        }
    }
}

impl SyncConfig {
    /// Create a configuration for the given remote base URL
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: Some(api_base_url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub const fn with_event_page_limit(mut self, limit: usize) -> Self {
        self.event_page_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Check if a remote store is configured
    pub fn is_remote_configured(&self) -> bool {
        normalize_text_option(self.api_base_url.clone()).is_some()
    }

    /// Normalized remote base URL without a trailing slash.
    pub fn remote_base_url(&self) -> Result<String, String> {
        let url = normalize_text_option(self.api_base_url.clone())
            .ok_or_else(|| "api_base_url is not configured".to_string())?;
        normalize_base_url(&url)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.app_id.trim().is_empty() {
            return Err("app_id must not be empty".to_string());
        }
        if self.event_page_limit == 0 {
            return Err("event_page_limit must be at least 1".to_string());
        }
        if self.is_remote_configured() {
            self.remote_base_url()?;
        }
        Ok(())
    }
}

/// Trim and validate an http(s) base URL.
pub fn normalize_base_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("base URL must not be empty".to_string());
    }
    if !is_http_url(trimmed) {
        return Err("base URL must include http:// or https://".to_string());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

const fn default_debounce() -> Duration {
    DEFAULT_DEBOUNCE
}

const fn default_retention() -> Duration {
    DEFAULT_RETENTION
}

const fn default_event_page_limit() -> usize {
    DEFAULT_EVENT_PAGE_LIMIT
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod optional_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer
                .serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.app_id, "trueheart");
        assert_eq!(config.debounce, Duration::from_secs(2));
        assert_eq!(config.retention, Duration::from_secs(2_592_000));
        assert!(!config.is_remote_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_base_url_trims_trailing_slash() {
        let config = SyncConfig::new(" https://api.example.com/ ");
        assert_eq!(config.remote_base_url().unwrap(), "https://api.example.com");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SyncConfig::new("api.example.com").validate().is_err());
        assert!(SyncConfig::default().with_app_id(" ").validate().is_err());
        assert!(SyncConfig::default()
            .with_event_page_limit(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"api_base_url":"https://api.example.com","debounce":500}"#)
                .unwrap();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.app_id, DEFAULT_APP_ID);
        assert_eq!(config.http_timeout, None);
    }
}
