//! Subscription fetcher with retry
//!
//! This module provides functionality for:
//! - Downloading raw subscription bodies over HTTP(S)
//! - Retrying transient failures with a fixed delay between attempts

use crate::error::SubscriptionError;
use crate::Result;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a single HTTP attempt in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default number of attempts per feed
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before each retry
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client signature; many providers only serve full subscriptions to known clients
const DEFAULT_USER_AGENT: &str = "clash.meta";

/// Configuration for the subscription fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for each HTTP attempt
    pub timeout: Duration,
    /// Total attempts before giving up on a feed
    pub max_attempts: u32,
    /// Wait before each retry
    pub retry_delay: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// HTTP client wrapper fetching one subscription body at a time
#[derive(Debug, Clone)]
pub struct SubscriptionFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SubscriptionFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch the raw body of `url`, retrying until the attempts run out
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("fetched {} bytes from {} (attempt {})", body.len(), url, attempt);
                    return Ok(body);
                }
                Err(e) => {
                    warn!("attempt {}/{} for {} failed: {}", attempt, self.config.max_attempts, url, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SubscriptionError::Fetch {
            url: url.to_string(),
            attempts: self.config.max_attempts,
            cause: last_error,
        }
        .into())
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response.bytes().await?.to_vec())
    }
}
