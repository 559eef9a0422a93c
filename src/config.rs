//! Collector configuration loaded from YAML

use crate::error::ConfigError;
use crate::proxy::{CollectorConfig, FetcherConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Subscription feed URLs, optionally with time placeholders
    pub sub_urls: Vec<String>,
    /// Attempts per feed
    pub sub_urls_retry: u32,
    /// Per-attempt HTTP timeout in seconds
    pub sub_urls_timeout: u64,
    /// Workers for both fetching and deduplication
    pub concurrent: usize,
    /// Protocol types to keep; empty keeps everything
    pub proxy_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sub_urls: Vec::new(),
            sub_urls_retry: 3,
            sub_urls_timeout: 5,
            concurrent: 20,
            proxy_types: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a YAML config file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrent",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sub_urls_retry == 0 {
            return Err(ConfigError::Invalid {
                field: "sub-urls-retry",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new()
            .with_max_attempts(self.sub_urls_retry)
            .with_timeout(Duration::from_secs(self.sub_urls_timeout))
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::new()
            .with_concurrency(self.concurrent)
            .with_allowed_types(self.proxy_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sub_urls_retry, 3);
        assert_eq!(config.concurrent, 20);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
concurrent: 8
sub-urls-retry: 5
sub-urls-timeout: 10
proxy-types: [vless, trojan]
sub-urls:
  - https://example.com/sub
  - https://example.com/{Y}/{m}/{d}.yaml
speed-test-url: https://ignored.example.com
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.concurrent, 8);
        assert_eq!(config.sub_urls.len(), 2);
        assert_eq!(config.proxy_types, vec!["vless", "trojan"]);

        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.max_attempts, 5);
        assert_eq!(fetcher.timeout, Duration::from_secs(10));

        let collector = config.collector_config();
        assert_eq!(collector.concurrency, 8);
        assert_eq!(collector.allowed_types.len(), 2);
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let err = Config::from_yaml("concurrent: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "concurrent", .. }));

        let err = Config::from_yaml("sub-urls-retry: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sub-urls-retry", .. }));
    }

    #[test]
    fn test_config_rejects_bad_yaml() {
        assert!(matches!(
            Config::from_yaml("concurrent: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_path("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
