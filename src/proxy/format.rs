//! Subscription payload format detection
//!
//! A feed body is one of:
//! - a base64 blob wrapping a list of proxy URIs
//! - a structured document with a `proxies:` section
//! - a plain newline-delimited list of proxy URIs

use base64::engine::general_purpose;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Marker token introducing the proxy list of a structured document
pub const SECTION_MARKER: &str = "proxies:";

/// Matches a line beginning with a recognized proxy URI scheme
static SCHEME_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(ssr|ss|vmess|trojan|vless|hysteria2|hysteria|hy2)://")
        .expect("Invalid scheme regex")
});

/// Detected layout of a feed body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// URI list wrapped in base64
    Base64UriList,
    /// Structured document with a proxy-list section
    Document,
    /// Plain URI list
    PlainUriList,
}

impl FeedFormat {
    pub fn is_uri_list(&self) -> bool {
        matches!(self, FeedFormat::Base64UriList | FeedFormat::PlainUriList)
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedFormat::Base64UriList => write!(f, "base64 uri list"),
            FeedFormat::Document => write!(f, "document"),
            FeedFormat::PlainUriList => write!(f, "uri list"),
        }
    }
}

/// A classified payload and the text to hand to the matching parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub format: FeedFormat,
    /// Decoded text for base64 payloads, the raw text otherwise
    pub text: String,
}

/// Decide which parser a feed body belongs to.
///
/// Returns `None` when the payload matches no known format.
pub fn classify(raw: &[u8]) -> Option<Classified> {
    let text = String::from_utf8_lossy(raw);

    if let Some(decoded) = decode_base64(&text) {
        if contains_scheme_line(&decoded) {
            return Some(Classified {
                format: FeedFormat::Base64UriList,
                text: decoded,
            });
        }
    }

    if text.contains(SECTION_MARKER) {
        return Some(Classified {
            format: FeedFormat::Document,
            text: text.into_owned(),
        });
    }

    if contains_scheme_line(&text) {
        return Some(Classified {
            format: FeedFormat::PlainUriList,
            text: text.into_owned(),
        });
    }

    None
}

/// Whether any line of `text` starts with a recognized scheme
pub fn contains_scheme_line(text: &str) -> bool {
    SCHEME_LINE_REGEX.is_match(text)
}

/// Decode base64 text, tolerating whitespace, missing padding and the URL-safe alphabet.
///
/// Invalid UTF-8 in the decoded bytes is replaced, never rejected.
pub fn decode_base64(input: &str) -> Option<String> {
    let bytes = decode_base64_bytes(input)?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Byte-level variant of [`decode_base64`]
pub fn decode_base64_bytes(input: &str) -> Option<Vec<u8>> {
    let clean: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.is_empty() {
        return None;
    }
    let unpadded = clean.trim_end_matches('=');

    let engines = [
        &general_purpose::STANDARD_NO_PAD,
        &general_purpose::URL_SAFE_NO_PAD,
    ];
    engines
        .iter()
        .find_map(|engine| engine.decode(unpadded).ok())
}
