//! Concurrent collection of proxies from many subscription feeds

use crate::error::SubscriptionError;
use crate::proxy::document::DocumentExtractor;
use crate::proxy::fetcher::SubscriptionFetcher;
use crate::proxy::format::{classify, FeedFormat};
use crate::proxy::models::ProxyRecord;
use crate::proxy::parser::ProxyParser;
use crate::Result;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Default number of feeds processed at once
const DEFAULT_CONCURRENCY: usize = 20;

/// Configuration for the subscription collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Upper bound on feeds fetched at once
    pub concurrency: usize,
    /// Protocol types to keep; empty keeps everything
    pub allowed_types: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            allowed_types: Vec::new(),
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_allowed_types(mut self, allowed_types: Vec<String>) -> Self {
        self.allowed_types = allowed_types;
        self
    }
}

/// Fetches and parses a batch of subscription feeds
pub struct SubscriptionCollector {
    config: CollectorConfig,
    fetcher: SubscriptionFetcher,
}

impl SubscriptionCollector {
    pub fn new(config: CollectorConfig, fetcher: SubscriptionFetcher) -> Self {
        Self { config, fetcher }
    }

    /// Fetch every feed and return the union of their proxies.
    ///
    /// A failing feed only logs and contributes nothing. The call fails with
    /// [`SubscriptionError::NoProxiesFound`] when the union is empty.
    pub async fn collect(&self, urls: &[String]) -> Result<Vec<ProxyRecord>> {
        let total = urls.len();
        info!("collecting from {} subscriptions", total);

        let workers = total.min(self.config.concurrency).max(1);
        let proxies: Mutex<Vec<ProxyRecord>> = Mutex::new(Vec::new());
        let failures: Mutex<Vec<String>> = Mutex::new(Vec::new());

        stream::iter(urls.iter().enumerate())
            .map(|(i, template)| {
                let proxies = &proxies;
                let failures = &failures;
                async move {
                    // substituted when this feed is dispatched, not when the batch starts
                    let url = expand_placeholders(template, &Local::now());
                    info!("fetching subscription ({}/{}): {}", i + 1, total, url);

                    match self.collect_one(&url).await {
                        Ok(records) => {
                            info!(
                                "subscription ({}/{}) yielded {} proxies: {}",
                                i + 1,
                                total,
                                records.len(),
                                url
                            );
                            if !records.is_empty() {
                                proxies.lock().await.extend(records);
                            }
                        }
                        Err(e) => {
                            error!("subscription ({}/{}) failed: {}: {}", i + 1, total, url, e);
                            failures.lock().await.push(e.to_string());
                        }
                    }
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<()>>()
            .await;

        let proxies = proxies.into_inner();
        if proxies.is_empty() {
            return Err(SubscriptionError::NoProxiesFound {
                failures: failures.into_inner(),
            }
            .into());
        }

        info!("collected {} proxies from {} subscriptions", proxies.len(), total);
        Ok(proxies)
    }

    async fn collect_one(&self, url: &str) -> Result<Vec<ProxyRecord>> {
        let body = self.fetcher.fetch(url).await?;
        parse_feed(&body, url, &self.config.allowed_types)
    }
}

/// Classify a feed body and decode every proxy it holds.
///
/// Records whose `type` is not in `allowed_types` are dropped; an empty list
/// keeps everything.
pub fn parse_feed(raw: &[u8], source: &str, allowed_types: &[String]) -> Result<Vec<ProxyRecord>> {
    let Some(classified) = classify(raw) else {
        warn!("unrecognized subscription format from {}", source);
        return Err(SubscriptionError::UnrecognizedFormat {
            url: source.to_string(),
        }
        .into());
    };

    let records = match classified.format {
        FeedFormat::Document => DocumentExtractor::extract(&classified.text, source),
        FeedFormat::Base64UriList | FeedFormat::PlainUriList => {
            ProxyParser::parse_string(&classified.text, source)
        }
    };

    let before = records.len();
    let records: Vec<ProxyRecord> = records
        .into_iter()
        .filter(|r| r.matches_types(allowed_types))
        .collect();
    if records.len() < before {
        info!(
            "type filter dropped {} of {} proxies from {}",
            before - records.len(),
            before,
            source
        );
    }
    Ok(records)
}

/// Replace `{Y}` `{m}` `{d}` `{H}` `{M}` `{S}` with the zero-padded fields of `now`
pub fn expand_placeholders<Tz: TimeZone>(url: &str, now: &DateTime<Tz>) -> String {
    if !url.contains('{') {
        return url.to_string();
    }
    url.replace("{Y}", &format!("{:04}", now.year()))
        .replace("{m}", &format!("{:02}", now.month()))
        .replace("{d}", &format!("{:02}", now.day()))
        .replace("{H}", &format!("{:02}", now.hour()))
        .replace("{M}", &format!("{:02}", now.minute()))
        .replace("{S}", &format!("{:02}", now.second()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::dedup::ProxyDeduplicator;
    use crate::proxy::fetcher::FetcherConfig;
    use base64::engine::general_purpose;
    use base64::Engine as _;
    use chrono::Utc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCUMENT: &str = r#"
mixed-port: 7890
proxies:
  - {name: doc-a, type: ss, server: 10.0.0.1, port: 8388, cipher: aes-128-gcm, password: pw}
  - name: doc-b
    type: trojan
    server: 10.0.0.2
    port: 443
    password: pw
rules:
  - MATCH,DIRECT
"#;

    fn vmess_line() -> String {
        let json = r#"{"ps":"vm","add":"10.0.0.3","port":"443","id":"uuid","aid":"0","net":"tcp"}"#;
        format!("vmess://{}", general_purpose::STANDARD.encode(json))
    }

    fn collector(concurrency: usize, allowed: &[&str]) -> SubscriptionCollector {
        let fetcher = SubscriptionFetcher::with_config(
            FetcherConfig::new()
                .with_max_attempts(2)
                .with_retry_delay(Duration::from_millis(10)),
        )
        .unwrap();
        let config = CollectorConfig::new()
            .with_concurrency(concurrency)
            .with_allowed_types(allowed.iter().map(|s| s.to_string()).collect());
        SubscriptionCollector::new(config, fetcher)
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.allowed_types.is_empty());
    }

    #[test]
    fn test_parse_feed_document() {
        let records = parse_feed(DOCUMENT.as_bytes(), "feed", &[]).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_feed == "feed"));
    }

    #[test]
    fn test_parse_feed_type_filter() {
        let records = parse_feed(DOCUMENT.as_bytes(), "feed", &["trojan".to_string()]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), Some("doc-b"));

        let plain = format!("{}\ntrojan://pw@10.0.0.9:443#t\n", vmess_line());
        let records = parse_feed(plain.as_bytes(), "feed", &["vmess".to_string()]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].type_name(), Some("vmess"));
    }

    #[test]
    fn test_parse_feed_base64_matches_plain() {
        let plain = format!(
            "{}\ntrojan://pw@10.0.0.9:443#t\nss://bad\n",
            vmess_line()
        );
        let encoded = general_purpose::STANDARD.encode(&plain);

        let from_plain = parse_feed(plain.as_bytes(), "feed", &[]).unwrap();
        let from_encoded = parse_feed(encoded.as_bytes(), "feed", &[]).unwrap();
        assert_eq!(from_plain.len(), 2);
        assert_eq!(from_plain, from_encoded);
    }

    #[test]
    fn test_parse_feed_base64_tolerates_invalid_utf8() {
        let plain: &[u8] = b"trojan://pw@10.0.0.9:443#ok\ntrojan://pw@10.0.0.8:443#bad-\xC4\n";
        let encoded = general_purpose::STANDARD.encode(plain);

        let from_plain = parse_feed(plain, "feed", &[]).unwrap();
        let from_encoded = parse_feed(encoded.as_bytes(), "feed", &[]).unwrap();
        assert_eq!(from_plain.len(), 2);
        assert_eq!(from_plain, from_encoded);
    }

    #[test]
    fn test_parse_feed_unrecognized() {
        let err = parse_feed(b"<html></html>", "feed", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SubscriptionError>(),
            Some(SubscriptionError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn test_expand_placeholders() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            expand_placeholders("https://x.com/{Y}/{m}/{Y}{m}{d}-{H}{M}{S}.yaml", &now),
            "https://x.com/2024/03/20240307-090502.yaml"
        );
        assert_eq!(expand_placeholders("https://x.com/sub", &now), "https://x.com/sub");
    }

    #[tokio::test]
    async fn test_collect_mixed_feeds() {
        let server = MockServer::start().await;
        mount(&server, "/doc", 200, DOCUMENT.to_string()).await;
        mount(
            &server,
            "/plain",
            200,
            format!("{}\nss://%%%malformed\n", vmess_line()),
        )
        .await;
        mount(&server, "/down", 503, String::new()).await;

        let urls: Vec<String> = ["/doc", "/plain", "/down"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();

        let records = collector(2, &[]).collect(&urls).await.unwrap();
        assert_eq!(records.len(), 3);

        let mut names: Vec<_> = records.iter().filter_map(|r| r.name()).collect();
        names.sort();
        assert_eq!(names, vec!["doc-a", "doc-b", "vm"]);

        // literal addresses, so no lookups leave the process
        let unique = ProxyDeduplicator::new().deduplicate(records).await;
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_collect_all_failed() {
        let server = MockServer::start().await;
        mount(&server, "/a", 500, String::new()).await;
        mount(&server, "/b", 200, "nothing useful".to_string()).await;

        let urls = vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())];
        let err = collector(4, &[]).collect(&urls).await.unwrap_err();
        match err.downcast_ref::<SubscriptionError>() {
            Some(SubscriptionError::NoProxiesFound { failures }) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collect_empty_section_is_not_a_failure() {
        let server = MockServer::start().await;
        mount(&server, "/empty", 200, "proxies:\nrules: []\n".to_string()).await;

        let urls = vec![format!("{}/empty", server.uri())];
        let err = collector(1, &[]).collect(&urls).await.unwrap_err();
        match err.downcast_ref::<SubscriptionError>() {
            Some(SubscriptionError::NoProxiesFound { failures }) => assert!(failures.is_empty()),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
