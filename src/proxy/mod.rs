//! Proxy module for collecting and deduplicating subscription proxies
//!
//! This module provides functionality for:
//! - Fetching subscription feeds with retry
//! - Classifying feed bodies and decoding document entries or proxy URIs
//! - Collecting many feeds concurrently into one record list
//! - Deduplicating records by resolved network identity

pub mod dedup;
pub mod document;
pub mod fetcher;
pub mod format;
pub mod models;
pub mod parser;
pub mod subscription;

pub use dedup::{deduplicate_by_address, HostResolver, ProxyDeduplicator, SystemResolver};
pub use document::DocumentExtractor;
pub use fetcher::{FetcherConfig, SubscriptionFetcher};
pub use format::{classify, FeedFormat};
pub use models::{to_document, Attributes, ProxyRecord, ProxyType};
pub use parser::ProxyParser;
pub use subscription::{parse_feed, CollectorConfig, SubscriptionCollector};
