//! `ss://` and `ssr://` decoding

use super::{is_truthy, parse_query, percent_decode, split_fragment, split_host_port, UriParts};
use crate::proxy::format::decode_base64;
use crate::proxy::models::{Attributes, AttributesBuilder, ProxyType};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

/// Decode SIP002 (`ss://userinfo@host:port`) or legacy (`ss://base64(...)`) links
pub(super) fn parse_ss(line: &str) -> Option<Attributes> {
    match UriParts::parse(line) {
        Some(parts) if parts.userinfo.is_some() => parse_sip002(parts),
        _ => parse_legacy(line),
    }
}

fn parse_sip002(parts: UriParts) -> Option<Attributes> {
    let user = parts.user();
    // plain `method:password` is allowed for 2022 ciphers, otherwise base64
    let credentials = if user.contains(':') {
        user.to_string()
    } else {
        decode_base64(user)?
    };
    let (cipher, password) = credentials.split_once(':')?;
    let port = parts.port_number()?;

    let builder = AttributesBuilder::new(ProxyType::Shadowsocks)
        .text("name", &parts.name)
        .text("server", &parts.host)
        .value("port", port)
        .text("cipher", cipher)
        .text("password", password)
        .value("udp", true);

    Some(apply_plugin(builder, parts.param("plugin")).build())
}

fn parse_legacy(line: &str) -> Option<Attributes> {
    let body = line.trim().strip_prefix("ss://")?;
    let (body, fragment) = split_fragment(body);
    let (encoded, query) = body.split_once('?').unwrap_or((body, ""));
    let decoded = decode_base64(encoded.trim_end_matches('/'))?;

    let (credentials, address) = decoded.rsplit_once('@')?;
    let (cipher, password) = credentials.split_once(':')?;
    let (host, port) = split_host_port(address)?;
    let port: u16 = port.trim().parse().ok()?;

    let query = parse_query(query);
    let builder = AttributesBuilder::new(ProxyType::Shadowsocks)
        .text("name", &fragment.map(percent_decode).unwrap_or_default())
        .text("server", &host)
        .value("port", port)
        .text("cipher", cipher)
        .text("password", password)
        .value("udp", true);

    Some(apply_plugin(builder, query.get("plugin").map(String::as_str)).build())
}

/// Translate a SIP003 plugin string such as `obfs-local;obfs=http;obfs-host=a.com`
fn apply_plugin(builder: AttributesBuilder, plugin: Option<&str>) -> AttributesBuilder {
    let Some(plugin) = plugin.filter(|p| !p.is_empty()) else {
        return builder;
    };
    let mut fields = plugin.split(';').map(str::trim);
    let name = fields.next().unwrap_or_default();
    let options: Vec<(&str, Option<&str>)> = fields
        .filter(|f| !f.is_empty())
        .map(|f| match f.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (f, None),
        })
        .collect();
    let option = |key: &str| {
        options
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| *v)
    };

    let mut opts = Mapping::new();
    if name.contains("obfs") {
        if let Some(mode) = option("obfs") {
            opts.insert("mode".into(), mode.into());
        }
        if let Some(host) = option("obfs-host") {
            opts.insert("host".into(), host.into());
        }
        return builder.value("plugin", "obfs").nested("plugin-opts", opts);
    }

    if name.contains("v2ray-plugin") {
        opts.insert("mode".into(), option("mode").unwrap_or("websocket").into());
        if let Some(host) = option("host") {
            opts.insert("host".into(), host.into());
        }
        if let Some(path) = option("path") {
            opts.insert("path".into(), path.into());
        }
        let tls = options.iter().any(|(k, v)| *k == "tls" && v.map_or(true, is_truthy));
        if tls {
            opts.insert("tls".into(), true.into());
        }
        return builder.value("plugin", "v2ray-plugin").nested("plugin-opts", opts);
    }

    for (key, value) in &options {
        let value = match value {
            Some(v) => Value::from(*v),
            None => Value::Bool(true),
        };
        opts.insert((*key).into(), value);
    }
    builder.text("plugin", name).nested("plugin-opts", opts)
}

/// Decode `ssr://base64(host:port:protocol:method:obfs:base64(password)/?params)`
pub(super) fn parse_ssr(line: &str) -> Option<Attributes> {
    let encoded = line.trim().strip_prefix("ssr://")?;
    let decoded = decode_base64(encoded)?;
    let (main, query) = match decoded.split_once("/?") {
        Some((main, query)) => (main, query),
        None => (decoded.trim_end_matches('/'), ""),
    };

    // host may be IPv6, so split from the right
    let mut fields = main.rsplitn(6, ':');
    let password = decode_base64(fields.next()?)?;
    let obfs = fields.next()?;
    let cipher = fields.next()?;
    let protocol = fields.next()?;
    let port: u16 = fields.next()?.parse().ok()?;
    let host = fields.next()?.trim_start_matches('[').trim_end_matches(']');

    let params = parse_ssr_params(query);
    let param = |key: &str| params.get(key).map(String::as_str).unwrap_or_default();

    Some(
        AttributesBuilder::new(ProxyType::ShadowsocksR)
            .text("name", param("remarks"))
            .text("server", host)
            .value("port", port)
            .text("cipher", cipher)
            .text("password", &password)
            .text("protocol", protocol)
            .text("obfs", obfs)
            .text("protocol-param", param("protoparam"))
            .text("obfs-param", param("obfsparam"))
            .text("group", param("group"))
            .value("udp", true)
            .build(),
    )
}

/// SSR parameter values are themselves base64; `+` must not become a space
fn parse_ssr_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(k, v)| Some((k.to_string(), decode_base64(v)?.trim().to_string())))
        .collect()
}
