//! `trojan://` decoding

use super::{Transport, UriParts};
use crate::proxy::models::{Attributes, AttributesBuilder, ProxyType};

/// Decode `trojan://password@host:port?params#name`
pub(super) fn parse_trojan(line: &str) -> Option<Attributes> {
    let parts = UriParts::parse(line)?;
    let password = parts.user();
    if password.is_empty() {
        return None;
    }
    let port = parts.port_number()?;

    let mut builder = AttributesBuilder::new(ProxyType::Trojan)
        .text("name", &parts.name)
        .text("server", &parts.host)
        .value("port", port)
        .text("password", password)
        .value("udp", true)
        .opt_text("sni", parts.param_any(&["sni", "peer"]))
        .opt_text("client-fingerprint", parts.param("fp"))
        .list("alpn", parts.param("alpn"));

    if parts.flag(&["allowInsecure", "allow_insecure", "insecure"]) {
        builder = builder.value("skip-cert-verify", true);
    }

    let transport = Transport {
        network: parts.param("type").unwrap_or_default(),
        path: parts.param("path"),
        host: parts.param("host"),
        service_name: parts.param("serviceName"),
    };
    Some(transport.apply(builder).build())
}
