//! Proxy URI parser
//!
//! Turns one `scheme://...` line into a canonical attribute map. Supported
//! schemes: `ss`, `ssr`, `vmess`, `trojan`, `vless`, `hysteria`, `hy2` and
//! `hysteria2`.

mod hysteria;
mod shadowsocks;
mod trojan;
mod v2ray;

use crate::proxy::models::{Attributes, AttributesBuilder, ProxyRecord, ProxyType};
use percent_encoding::percent_decode_str;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use tracing::debug;

/// Proxy parser for decoding proxy URIs
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy URI line
    ///
    /// Returns `None` for blank lines, comments, unknown schemes and any line
    /// that does not decode to at least a server and a port.
    pub fn parse_line(line: &str) -> Option<Attributes> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (scheme, _) = line.split_once("://")?;
        let proxy_type = ProxyType::from_scheme(&scheme.to_ascii_lowercase())?;

        let attributes = match proxy_type {
            ProxyType::Shadowsocks => shadowsocks::parse_ss(line),
            ProxyType::ShadowsocksR => shadowsocks::parse_ssr(line),
            ProxyType::Vmess => v2ray::parse_vmess(line),
            ProxyType::Vless => v2ray::parse_vless(line),
            ProxyType::Trojan => trojan::parse_trojan(line),
            ProxyType::Hysteria => hysteria::parse_hysteria(line),
            ProxyType::Hysteria2 => hysteria::parse_hysteria2(line),
        }?;

        finish(proxy_type, attributes)
    }

    /// Parse proxies from a string (one URI per line), skipping lines that fail
    pub fn parse_string(content: &str, source: &str) -> Vec<ProxyRecord> {
        let mut skipped = 0;
        let records: Vec<ProxyRecord> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match Self::parse_line(line) {
                Some(attributes) => Some(ProxyRecord::new(attributes, source)),
                None => {
                    skipped += 1;
                    debug!("skipping undecodable line from {}: {:.60}", source, line.trim());
                    None
                }
            })
            .collect();

        debug!(
            "decoded {} proxy uris from {} ({} skipped)",
            records.len(),
            source,
            skipped
        );
        records
    }
}

/// Reject records without server/port and synthesize a missing name
fn finish(proxy_type: ProxyType, mut attributes: Attributes) -> Option<Attributes> {
    let server = attributes
        .get("server")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_string();
    let port = attributes
        .get("port")
        .and_then(Value::as_u64)
        .filter(|p| (1..=u64::from(u16::MAX)).contains(p))?;

    let has_name = attributes
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.is_empty());
    if !has_name {
        attributes.insert(
            "name".into(),
            format!("{} {}:{}", proxy_type, server, port).into(),
        );
    }
    Some(attributes)
}

/// Authority, query and fragment of a proxy URI
#[derive(Debug, Clone, Default)]
pub(crate) struct UriParts {
    /// Percent-decoded credentials before `@`
    pub userinfo: Option<String>,
    pub host: String,
    /// Raw port text, possibly a multi-port list
    pub port: String,
    pub query: HashMap<String, String>,
    /// Percent-decoded fragment
    pub name: String,
}

impl UriParts {
    /// Split `scheme://[userinfo@]host:port[/path][?query][#fragment]`
    pub fn parse(line: &str) -> Option<Self> {
        let (_, rest) = line.trim().split_once("://")?;
        let (rest, fragment) = split_fragment(rest);
        let (rest, query) = match rest.split_once('?') {
            Some((head, query)) => (head, query),
            None => (rest, ""),
        };
        let (userinfo, address) = match rest.rfind('@') {
            Some(at) => (Some(percent_decode(&rest[..at])), &rest[at + 1..]),
            None => (None, rest),
        };
        let address = address.split('/').next().unwrap_or_default();
        let (host, port) = split_host_port(address)?;

        Some(Self {
            userinfo,
            host,
            port: port.to_string(),
            query: parse_query(query),
            name: fragment.map(percent_decode).unwrap_or_default(),
        })
    }

    /// The port as a number; multi-port text does not count
    pub fn port_number(&self) -> Option<u16> {
        self.port.parse::<u16>().ok().filter(|p| *p != 0)
    }

    /// A non-empty query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// The first non-empty parameter among `keys`
    pub fn param_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.param(k))
    }

    /// Whether any of `keys` holds a truthy value
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.param_any(keys).is_some_and(is_truthy)
    }

    /// Credentials, empty when absent
    pub fn user(&self) -> &str {
        self.userinfo.as_deref().unwrap_or_default()
    }
}

/// Split off a `#fragment`
pub(crate) fn split_fragment(s: &str) -> (&str, Option<&str>) {
    match s.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (s, None),
    }
}

/// Split `host:port` or `[v6]:port`, stripping IPv6 brackets
pub(crate) fn split_host_port(address: &str) -> Option<(String, &str)> {
    let address = address.trim();
    let (host, port) = if let Some(v6) = address.strip_prefix('[') {
        let (host, rest) = v6.split_once(']')?;
        (host, rest.strip_prefix(':')?)
    } else {
        address.rsplit_once(':')?
    };
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

pub(crate) fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().trim().to_string()
}

/// Decode an `application/x-www-form-urlencoded` query
pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

pub(crate) fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Transport parameters shared by the v2ray-family schemes
#[derive(Debug, Default)]
pub(crate) struct Transport<'a> {
    pub network: &'a str,
    pub path: Option<&'a str>,
    pub host: Option<&'a str>,
    pub service_name: Option<&'a str>,
}

impl Transport<'_> {
    /// Add `network` and the matching `*-opts` mapping
    pub fn apply(&self, builder: AttributesBuilder) -> AttributesBuilder {
        let network = self.network.to_ascii_lowercase();
        match network.as_str() {
            "" | "tcp" | "none" => builder,
            "ws" | "httpupgrade" => {
                let mut opts = Mapping::new();
                if let Some(path) = self.path {
                    opts.insert("path".into(), path.into());
                }
                if let Some(host) = self.host {
                    let mut headers = Mapping::new();
                    headers.insert("Host".into(), host.into());
                    opts.insert("headers".into(), Value::Mapping(headers));
                }
                builder.value("network", network.as_str()).nested("ws-opts", opts)
            }
            "h2" => {
                let mut opts = Mapping::new();
                if let Some(path) = self.path {
                    opts.insert("path".into(), path.into());
                }
                if let Some(host) = self.host {
                    opts.insert("host".into(), Value::Sequence(vec![host.into()]));
                }
                builder.value("network", "h2").nested("h2-opts", opts)
            }
            "http" => {
                let mut opts = Mapping::new();
                if let Some(path) = self.path {
                    opts.insert("path".into(), Value::Sequence(vec![path.into()]));
                }
                if let Some(host) = self.host {
                    let mut headers = Mapping::new();
                    headers.insert("Host".into(), Value::Sequence(vec![host.into()]));
                    opts.insert("headers".into(), Value::Mapping(headers));
                }
                builder.value("network", "http").nested("http-opts", opts)
            }
            "grpc" => {
                let mut opts = Mapping::new();
                if let Some(service) = self.service_name {
                    opts.insert("grpc-service-name".into(), service.into());
                }
                builder.value("network", "grpc").nested("grpc-opts", opts)
            }
            other => builder.value("network", other),
        }
    }
}
