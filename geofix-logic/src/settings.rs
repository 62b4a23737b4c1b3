use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Parameters for a single [crate::LocationCoordinator::fetch]
pub struct RequestConfig {
    /// A cached fix no older than this is returned without touching the provider
    pub maximum_age: Duration,
    /// How long to wait for a fresh fix, zero means don't wait at all
    pub timeout: Duration,
    /// Ask the provider for its more precise (and more power hungry) mode
    pub high_accuracy: bool,
}

impl RequestConfig {
    pub const DEFAULT_MAXIMUM_AGE: Duration = Duration::from_secs(120);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(maximum_age: Duration, timeout: Duration, high_accuracy: bool) -> Self {
        Self {
            maximum_age,
            timeout,
            high_accuracy,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            maximum_age: Self::DEFAULT_MAXIMUM_AGE,
            timeout: Self::DEFAULT_TIMEOUT,
            high_accuracy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Web-style options, durations in milliseconds. Missing fields fall back to the
/// [RequestConfig] defaults.
pub struct PositionOptions {
    pub maximum_age: u64,
    pub timeout: u64,
    pub enable_high_accuracy: bool,
}

impl Default for PositionOptions {
    fn default() -> Self {
        RequestConfig::default().into()
    }
}

impl From<PositionOptions> for RequestConfig {
    fn from(opts: PositionOptions) -> Self {
        Self {
            maximum_age: Duration::from_millis(opts.maximum_age),
            timeout: Duration::from_millis(opts.timeout),
            high_accuracy: opts.enable_high_accuracy,
        }
    }
}

impl From<RequestConfig> for PositionOptions {
    fn from(config: RequestConfig) -> Self {
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            maximum_age: millis(config.maximum_age),
            timeout: millis(config.timeout),
            enable_high_accuracy: config.high_accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RequestConfig::default();
        assert_eq!(config.maximum_age, Duration::from_secs(120));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.high_accuracy);
    }

    #[test]
    fn test_partial_options_use_defaults() {
        let opts: PositionOptions =
            serde_json::from_str(r#"{"maximumAge": 0, "enableHighAccuracy": false}"#)
                .expect("Failed to parse");
        let config = RequestConfig::from(opts);
        assert_eq!(config.maximum_age, Duration::ZERO);
        assert_eq!(config.timeout, RequestConfig::DEFAULT_TIMEOUT);
        assert!(!config.high_accuracy);
    }
}
