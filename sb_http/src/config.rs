use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde::Deserializer;

use crate::retry::RetryPolicy;

/// Settings a [`crate::Dispatcher`] is built from
#[derive(Debug, Deserialize)]
pub struct DispatcherConfig {
    /// Default region for calls without an override (default: `na`)
    #[serde(default = "default_region")]
    pub region: String,

    /// Sent as `X-Riot-Token` on every call
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: SecretString,

    /// Per-call network timeout (default: 10000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Send every call to this base URL instead of the routed host; quota buckets are unchanged
    #[serde(default)]
    pub endpoint_override: Option<String>,
}

impl DispatcherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            region: default_region(),
            api_key: SecretString::from(api_key.into()),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
            endpoint_override: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_region() -> String {
    "na".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: DispatcherConfig = serde_json::from_str(r#"{"api_key": "RGAPI-test"}"#).unwrap();

        assert_eq!(config.region, "na");
        assert_eq!(config.api_key.expose_secret(), "RGAPI-test");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.endpoint_override, None);
    }

    #[test]
    fn test_debug_hides_key() {
        let config = DispatcherConfig::new("RGAPI-secret");
        assert!(!format!("{:?}", config).contains("RGAPI-secret"));
    }
}
