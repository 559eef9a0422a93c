//! `vmess://` and `vless://` decoding

use super::{Transport, UriParts};
use crate::proxy::format::decode_base64;
use crate::proxy::models::{Attributes, AttributesBuilder, ProxyType};
use serde_json::Value as JsonValue;
use serde_yaml::Mapping;

/// A JSON field as text; numbers and booleans are stringified
fn json_str(obj: &JsonValue, key: &str) -> Option<String> {
    let text = match obj.get(key)? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A JSON field as an integer, accepting numeric strings
fn json_u64(obj: &JsonValue, key: &str) -> Option<u64> {
    match obj.get(key)? {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode `vmess://base64(json)`
pub(super) fn parse_vmess(line: &str) -> Option<Attributes> {
    let encoded = line.trim().strip_prefix("vmess://")?;
    let encoded = encoded.split('#').next().unwrap_or_default();
    let decoded = decode_base64(encoded)?;
    let obj: JsonValue = serde_json::from_str(&decoded).ok()?;

    let server = json_str(&obj, "add")?;
    let port = u16::try_from(json_u64(&obj, "port")?).ok()?;
    let uuid = json_str(&obj, "id")?;
    let tls = json_str(&obj, "tls").is_some_and(|t| t.eq_ignore_ascii_case("tls"));
    let insecure = ["allowInsecure", "skip-cert-verify"]
        .iter()
        .filter_map(|k| json_str(&obj, k))
        .any(|v| super::is_truthy(&v));

    let network = json_str(&obj, "net").unwrap_or_default();
    let path = json_str(&obj, "path");
    let host = json_str(&obj, "host");
    let transport = Transport {
        network: &network,
        path: path.as_deref(),
        host: host.as_deref(),
        // grpc links carry the service name in `path`
        service_name: path.as_deref(),
    };

    let builder = AttributesBuilder::new(ProxyType::Vmess)
        .opt_text("name", json_str(&obj, "ps").as_deref())
        .text("server", &server)
        .value("port", port)
        .text("uuid", &uuid)
        .value("alterId", json_u64(&obj, "aid").unwrap_or(0))
        .text("cipher", json_str(&obj, "scy").as_deref().unwrap_or("auto"))
        .value("udp", true)
        .value("tls", tls)
        .opt_text("servername", json_str(&obj, "sni").as_deref())
        .list("alpn", json_str(&obj, "alpn").as_deref())
        .opt_text("client-fingerprint", json_str(&obj, "fp").as_deref());
    let builder = if insecure {
        builder.value("skip-cert-verify", true)
    } else {
        builder
    };

    Some(transport.apply(builder).build())
}

/// Decode `vless://uuid@host:port?params#name`
pub(super) fn parse_vless(line: &str) -> Option<Attributes> {
    let parts = UriParts::parse(line)?;
    let uuid = parts.user();
    if uuid.is_empty() {
        return None;
    }
    let port = parts.port_number()?;

    let security = parts.param("security").unwrap_or_default().to_ascii_lowercase();
    let tls = matches!(security.as_str(), "tls" | "xtls" | "reality");

    let mut builder = AttributesBuilder::new(ProxyType::Vless)
        .text("name", &parts.name)
        .text("server", &parts.host)
        .value("port", port)
        .text("uuid", uuid)
        .value("udp", true)
        .value("tls", tls)
        .opt_text("servername", parts.param_any(&["sni", "serverName", "peer"]))
        .opt_text("flow", parts.param("flow"))
        .opt_text("client-fingerprint", parts.param("fp"))
        .list("alpn", parts.param("alpn"));

    if parts.flag(&["allowInsecure", "allow_insecure", "insecure"]) {
        builder = builder.value("skip-cert-verify", true);
    }

    if security == "reality" {
        let mut reality = Mapping::new();
        if let Some(key) = parts.param("pbk") {
            reality.insert("public-key".into(), key.into());
        }
        if let Some(sid) = parts.param("sid") {
            reality.insert("short-id".into(), sid.into());
        }
        builder = builder.nested("reality-opts", reality);
    }

    let transport = Transport {
        network: parts.param("type").unwrap_or_default(),
        path: parts.param("path"),
        host: parts.param("host"),
        service_name: parts.param("serviceName"),
    };
    Some(transport.apply(builder).build())
}
