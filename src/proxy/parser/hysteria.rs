//! `hysteria://`, `hy2://` and `hysteria2://` decoding

use super::UriParts;
use crate::proxy::models::{Attributes, AttributesBuilder, ProxyType};

/// Decode `hysteria://host:port?auth=..&peer=..&upmbps=..&downmbps=..#name`
pub(super) fn parse_hysteria(line: &str) -> Option<Attributes> {
    let parts = UriParts::parse(line)?;
    let port = parts.port_number()?;

    let mut builder = AttributesBuilder::new(ProxyType::Hysteria)
        .text("name", &parts.name)
        .text("server", &parts.host)
        .value("port", port)
        .opt_text("auth-str", parts.param_any(&["auth", "auth_str"]))
        .opt_text("sni", parts.param_any(&["peer", "sni"]))
        .opt_text("protocol", parts.param("protocol"))
        .opt_text("up", parts.param_any(&["upmbps", "up"]))
        .opt_text("down", parts.param_any(&["downmbps", "down"]))
        .opt_text("obfs", parts.param("obfsParam"))
        .list("alpn", parts.param("alpn"));

    if parts.flag(&["insecure", "allowInsecure"]) {
        builder = builder.value("skip-cert-verify", true);
    }
    Some(builder.build())
}

/// Decode `hysteria2://password@host:port[,ports]?sni=..&obfs=..#name`
pub(super) fn parse_hysteria2(line: &str) -> Option<Attributes> {
    let parts = UriParts::parse(line)?;
    let (port, ports) = match parts.port_number() {
        Some(port) => (port, parts.param("mport")),
        None => (first_port(&parts.port)?, Some(parts.port.as_str())),
    };

    let mut builder = AttributesBuilder::new(ProxyType::Hysteria2)
        .text("name", &parts.name)
        .text("server", &parts.host)
        .value("port", port)
        .opt_text("ports", ports)
        .text("password", parts.user())
        .opt_text("sni", parts.param_any(&["sni", "peer"]))
        .opt_text("obfs", parts.param("obfs"))
        .opt_text("obfs-password", parts.param("obfs-password"))
        .opt_text("fingerprint", parts.param("pinSHA256"))
        .list("alpn", parts.param("alpn"));

    if parts.flag(&["insecure", "allowInsecure"]) {
        builder = builder.value("skip-cert-verify", true);
    }
    Some(builder.build())
}

/// First port of a multi-port list such as `443,8000-9000`
fn first_port(ports: &str) -> Option<u16> {
    let first = ports.split([',', '-']).next()?;
    first.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn get<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
        attrs.get(key).and_then(Value::as_str)
    }

    #[test]
    fn test_parse_hysteria() {
        let line = "hysteria://h.example.com:36712?protocol=udp&auth=token&peer=p.example.com&insecure=1&upmbps=50&downmbps=100&alpn=h3&obfs=xplus&obfsParam=mask#HY";
        let attrs = parse_hysteria(line).unwrap();
        assert_eq!(get(&attrs, "type"), Some("hysteria"));
        assert_eq!(get(&attrs, "name"), Some("HY"));
        assert_eq!(attrs.get("port").and_then(Value::as_u64), Some(36712));
        assert_eq!(get(&attrs, "auth-str"), Some("token"));
        assert_eq!(get(&attrs, "sni"), Some("p.example.com"));
        assert_eq!(get(&attrs, "up"), Some("50"));
        assert_eq!(get(&attrs, "down"), Some("100"));
        assert_eq!(get(&attrs, "obfs"), Some("mask"));
        assert_eq!(attrs.get("skip-cert-verify").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_parse_hysteria2() {
        let line = "hysteria2://letmein@h2.example.com:443/?sni=s.example.com&obfs=salamander&obfs-password=gawr&insecure=0#H2";
        let attrs = parse_hysteria2(line).unwrap();
        assert_eq!(get(&attrs, "type"), Some("hysteria2"));
        assert_eq!(get(&attrs, "password"), Some("letmein"));
        assert_eq!(attrs.get("port").and_then(Value::as_u64), Some(443));
        assert_eq!(get(&attrs, "sni"), Some("s.example.com"));
        assert_eq!(get(&attrs, "obfs"), Some("salamander"));
        assert_eq!(get(&attrs, "obfs-password"), Some("gawr"));
        assert!(attrs.get("skip-cert-verify").is_none());
        assert!(attrs.get("ports").is_none());
    }

    #[test]
    fn test_parse_hy2_multi_port() {
        let line = "hy2://pw@h2.example.com:443,8000-9000?insecure=1";
        let attrs = parse_hysteria2(line).unwrap();
        assert_eq!(attrs.get("port").and_then(Value::as_u64), Some(443));
        assert_eq!(get(&attrs, "ports"), Some("443,8000-9000"));
    }

    #[test]
    fn test_first_port() {
        assert_eq!(first_port("443,8000-9000"), Some(443));
        assert_eq!(first_port("20000-30000"), Some(20000));
        assert_eq!(first_port("x"), None);
    }
}
