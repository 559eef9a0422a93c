//! Proxy deduplication by network identity
//!
//! Two records are the same proxy when their routing hostname resolves to the
//! same address and they share a port. The first record to claim an identity
//! wins; with several workers running, which duplicate gets there first is not
//! deterministic.

use crate::proxy::models::ProxyRecord;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default number of concurrent lookups
const DEFAULT_CONCURRENCY: usize = 20;

/// Resolves a hostname to its first address
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Resolver backed by the system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                debug!("cannot resolve {}: {}", host, e);
                None
            }
        }
    }
}

/// Hostname whose address identifies the proxy.
///
/// `vless` and `vmess` route on the TLS server name, so a non-empty
/// `servername` is preferred over `server` for those two types only.
pub fn identity_host(record: &ProxyRecord) -> Option<&str> {
    let routes_by_name = record
        .proxy_type()
        .is_some_and(|t| t.routes_by_server_name());
    if routes_by_name {
        if let Some(name) = record.servername().filter(|s| !s.is_empty()) {
            return Some(name);
        }
    }
    record.server()
}

/// First-seen-wins map from resolved identity to record, built fresh per run
#[derive(Debug, Default)]
struct IdentityMap {
    entries: Mutex<HashMap<SocketAddr, ProxyRecord>>,
}

impl IdentityMap {
    /// Insert unless the identity is already claimed; returns whether it was inserted
    async fn claim(&self, key: SocketAddr, record: ProxyRecord) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, record);
        true
    }

    fn into_records(self) -> Vec<ProxyRecord> {
        self.entries.into_inner().into_values().collect()
    }
}

/// Collapses records sharing a resolved `(ip, port)` identity
pub struct ProxyDeduplicator<R = SystemResolver> {
    resolver: R,
    concurrency: usize,
}

impl ProxyDeduplicator<SystemResolver> {
    /// Create a deduplicator using the system resolver
    pub fn new() -> Self {
        Self::with_resolver(SystemResolver)
    }
}

impl Default for ProxyDeduplicator<SystemResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: HostResolver> ProxyDeduplicator<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Identity key of a record, `None` when it has no usable host/port or does not resolve
    pub async fn identity(&self, record: &ProxyRecord) -> Option<SocketAddr> {
        let host = identity_host(record)?;
        let port = record.port()?;
        let ip = self.resolver.resolve(host).await?;
        Some(SocketAddr::new(ip, port))
    }

    /// Keep one record per identity; output order is unspecified
    pub async fn deduplicate(&self, records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        let total = records.len();
        let seen = IdentityMap::default();

        let outcomes: Vec<Outcome> = stream::iter(records)
            .map(|record| {
                let seen = &seen;
                async move {
                    let Some(key) = self.identity(&record).await else {
                        return Outcome::Unresolved;
                    };
                    if seen.claim(key, record).await {
                        Outcome::Kept
                    } else {
                        Outcome::Duplicate
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let duplicates = outcomes.iter().filter(|o| **o == Outcome::Duplicate).count();
        let unresolved = outcomes.iter().filter(|o| **o == Outcome::Unresolved).count();
        let unique = seen.into_records();
        info!(
            "deduplicated {} proxies to {} ({} duplicates, {} unresolved)",
            total,
            unique.len(),
            duplicates,
            unresolved
        );
        unique
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Kept,
    Duplicate,
    Unresolved,
}

/// Keep the first record per literal `server:port`, without DNS.
///
/// Records missing a string `server` or an integer `port` are dropped. Input
/// order is preserved.
pub fn deduplicate_by_address(records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match record.to_simple_string() {
            Some(key) => seen.insert(key),
            None => false,
        })
        .collect()
}
