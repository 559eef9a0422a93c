//! Error types surfaced by the collector
//!
//! Functions in this crate return [`crate::Result`]; the variants below are
//! carried inside the `anyhow::Error` so callers can `downcast_ref` when they
//! need to tell conditions apart.

use thiserror::Error;

/// Errors raised while acquiring and parsing subscription feeds
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Every attempt to fetch a feed failed
    #[error("fetching {url} failed after {attempts} attempts: {cause}")]
    Fetch {
        url: String,
        attempts: u32,
        cause: String,
    },

    /// A single response carried a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The payload matched none of the known feed formats
    #[error("unrecognized subscription format from {url}")]
    UnrecognizedFormat { url: String },

    /// No feed yielded a single proxy
    #[error("{}", no_proxies_message(.failures))]
    NoProxiesFound { failures: Vec<String> },
}

fn no_proxies_message(failures: &[String]) -> String {
    if failures.is_empty() {
        "no usable proxies found".to_string()
    } else {
        format!("all subscriptions failed: {}", failures.join("; "))
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
