//! Sub Collector - Proxy Subscription Aggregator
//!
//! Fetches proxy subscription feeds concurrently, decodes the proxies they
//! carry (structured `proxies:` documents, plain or base64 URI lists) and
//! collapses duplicates that resolve to the same network endpoint.

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;

pub use config::Config;
pub use error::{ConfigError, SubscriptionError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
