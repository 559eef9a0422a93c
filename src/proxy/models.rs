//! Proxy data models

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

/// Protocol-specific attribute map describing one proxy
pub type Attributes = Mapping;

/// Proxy protocol enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Shadowsocks,
    ShadowsocksR,
    Vmess,
    Trojan,
    Vless,
    Hysteria,
    Hysteria2,
}

impl ProxyType {
    /// Every URI scheme token recognized in subscription feeds
    pub const SCHEMES: [&'static str; 8] = [
        "ss",
        "ssr",
        "vmess",
        "trojan",
        "vless",
        "hysteria",
        "hy2",
        "hysteria2",
    ];

    /// Resolve a URI scheme token, `hy2` being an alias of `hysteria2`
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ss" => Some(ProxyType::Shadowsocks),
            "ssr" => Some(ProxyType::ShadowsocksR),
            "vmess" => Some(ProxyType::Vmess),
            "trojan" => Some(ProxyType::Trojan),
            "vless" => Some(ProxyType::Vless),
            "hysteria" => Some(ProxyType::Hysteria),
            "hy2" | "hysteria2" => Some(ProxyType::Hysteria2),
            _ => None,
        }
    }

    /// The value stored under the `type` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Shadowsocks => "ss",
            ProxyType::ShadowsocksR => "ssr",
            ProxyType::Vmess => "vmess",
            ProxyType::Trojan => "trojan",
            ProxyType::Vless => "vless",
            ProxyType::Hysteria => "hysteria",
            ProxyType::Hysteria2 => "hysteria2",
        }
    }

    /// Protocols whose routing decision is made on the TLS server name
    pub fn routes_by_server_name(&self) -> bool {
        matches!(self, ProxyType::Vless | ProxyType::Vmess)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProxyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_scheme(&s.to_ascii_lowercase())
            .ok_or_else(|| anyhow::anyhow!("unknown proxy type: {}", s))
    }
}

/// One proxy descriptor extracted from a feed
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRecord {
    /// Canonical attribute map (`type`, `server`, `port`, ...)
    pub attributes: Attributes,
    /// Feed URL the record came from
    pub source_feed: String,
}

impl ProxyRecord {
    pub fn new(attributes: Attributes, source_feed: impl Into<String>) -> Self {
        Self {
            attributes,
            source_feed: source_feed.into(),
        }
    }

    /// Look up a raw attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Look up a string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The `type` attribute as written in the feed
    pub fn type_name(&self) -> Option<&str> {
        self.get_str("type")
    }

    /// The `type` attribute as a known protocol
    pub fn proxy_type(&self) -> Option<ProxyType> {
        self.type_name().and_then(ProxyType::from_scheme)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn server(&self) -> Option<&str> {
        self.get_str("server")
    }

    /// The `port` attribute; only integer values in range count
    pub fn port(&self) -> Option<u16> {
        self.get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
    }

    pub fn servername(&self) -> Option<&str> {
        self.get_str("servername")
    }

    /// Get the proxy string in SERVER:PORT format
    pub fn to_simple_string(&self) -> Option<String> {
        Some(format!("{}:{}", self.server()?, self.port()?))
    }

    /// Whether the `type` attribute appears in `allowed` (an empty list allows everything)
    pub fn matches_types(&self, allowed: &[String]) -> bool {
        if allowed.is_empty() {
            return true;
        }
        match self.type_name() {
            Some(t) => allowed.iter().any(|a| a.eq_ignore_ascii_case(t)),
            None => false,
        }
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}",
            self.type_name().unwrap_or("unknown"),
            self.server().unwrap_or("?"),
            self.port().map_or_else(|| "?".to_string(), |p| p.to_string())
        )
    }
}

/// `proxies:` document wrapping the attribute maps of a record list
#[derive(Debug, Serialize)]
struct ProxiesDocument<'a> {
    proxies: Vec<&'a Attributes>,
}

/// Render records as a YAML document with a single `proxies` sequence
pub fn to_document(records: &[ProxyRecord]) -> crate::Result<String> {
    let document = ProxiesDocument {
        proxies: records.iter().map(|r| &r.attributes).collect(),
    };
    Ok(serde_yaml::to_string(&document)?)
}

/// Incremental builder for an attribute map, skipping empty values
#[derive(Debug, Default)]
pub struct AttributesBuilder {
    map: Mapping,
}

impl AttributesBuilder {
    pub fn new(proxy_type: ProxyType) -> Self {
        let mut builder = Self::default();
        builder.map.insert("type".into(), proxy_type.as_str().into());
        builder
    }

    /// Insert any value under `key`
    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.map.insert(key.into(), value.into());
        self
    }

    /// Insert a string unless it is empty
    pub fn text(self, key: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.value(key, value)
    }

    /// Insert an optional string unless it is missing or empty
    pub fn opt_text(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.text(key, v),
            None => self,
        }
    }

    /// Insert a nested mapping unless it is empty
    pub fn nested(self, key: &str, value: Mapping) -> Self {
        if value.is_empty() {
            return self;
        }
        self.value(key, Value::Mapping(value))
    }

    /// Insert a comma-separated list as a sequence unless it is empty
    pub fn list(self, key: &str, value: Option<&str>) -> Self {
        let items: Vec<Value> = value
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect();
        if items.is_empty() {
            return self;
        }
        self.value(key, Value::Sequence(items))
    }

    pub fn build(self) -> Attributes {
        self.map
    }
}
