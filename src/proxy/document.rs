//! Tolerant extraction of proxy entries from structured subscription documents
//!
//! Subscription documents are often not well-formed as a whole (stray control
//! characters, broken indentation, trailing junk) while every single entry in
//! their `proxies:` list still is. Rather than parse the whole document, the
//! extractor scans the list section line by line, buffers one entry at a time
//! and parses each entry on its own. A broken entry is logged and dropped; its
//! neighbours are unaffected.

use crate::proxy::format::SECTION_MARKER;
use crate::proxy::models::{Attributes, ProxyRecord};
use tracing::debug;

/// Scanner position relative to the proxy-list section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Before the section marker
    Outside,
    /// After the marker, no entry started yet
    InSection,
    /// Collecting the lines of one entry
    Buffering,
}

/// Line-buffered scanner over a document's proxy-list section
pub struct DocumentExtractor<'a> {
    source: &'a str,
    state: ScanState,
    /// Item indentation, fixed by the first content line after the marker
    indent: Option<usize>,
    pending: Vec<&'a str>,
    records: Vec<ProxyRecord>,
    rejected: usize,
}

impl<'a> DocumentExtractor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            state: ScanState::Outside,
            indent: None,
            pending: Vec::new(),
            records: Vec::new(),
            rejected: 0,
        }
    }

    /// Extract every parseable entry of the document's proxy list.
    ///
    /// `source` is recorded as provenance on each record.
    pub fn extract(text: &str, source: &str) -> Vec<ProxyRecord> {
        let sanitized = sanitize(text);
        let mut extractor = DocumentExtractor::new(source);
        extractor.scan(&sanitized);

        debug!(
            "extracted {} entries from {} ({} rejected)",
            extractor.records.len(),
            source,
            extractor.rejected
        );
        extractor.records
    }

    fn scan(&mut self, text: &'a str) {
        for line in text.lines() {
            let trimmed = line.trim();

            if self.state == ScanState::Outside {
                if trimmed == SECTION_MARKER {
                    self.state = ScanState::InSection;
                }
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let indent = indentation(line);
            if indent == 0 && !trimmed.starts_with('-') {
                break;
            }

            let item_indent = *self.indent.get_or_insert(indent);
            if trimmed.starts_with('-') && indent == item_indent {
                self.flush();
                self.state = ScanState::Buffering;
                self.pending.push(line);
            } else if self.state == ScanState::Buffering {
                self.pending.push(line);
            }
        }
        self.flush();
    }

    /// Parse the buffered entry, keeping it only when it is a single mapping
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let indent = self.indent.unwrap_or(0);
        let block = self
            .pending
            .drain(..)
            .map(|line| dedent(line, indent))
            .collect::<Vec<_>>()
            .join("\n");

        match parse_entry(&block) {
            Ok(attributes) => self.records.push(ProxyRecord::new(attributes, self.source)),
            Err(e) => {
                self.rejected += 1;
                debug!("skipping malformed entry in {}: {}", self.source, e);
            }
        }
    }
}

/// Parse one buffered block as a one-element list holding a mapping
fn parse_entry(block: &str) -> crate::Result<Attributes> {
    let mut entries: Vec<Attributes> = serde_yaml::from_str(block)?;
    match entries.len() {
        1 => Ok(entries.remove(0)),
        n => Err(anyhow::anyhow!("expected one entry, found {}", n)),
    }
}

/// Drop every character outside printable ASCII, line breaks, tabs and CJK ideographs
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|&c| is_kept(c)).collect()
}

fn is_kept(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{7e}' | '\n' | '\r' | '\t' | '\u{4e00}'..='\u{9fff}')
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Strip up to `width` leading whitespace characters
fn dedent(line: &str, width: usize) -> &str {
    let cut = line
        .char_indices()
        .take(width)
        .take_while(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    &line[cut..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(records: &[ProxyRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.name()).collect()
    }

    #[test]
    fn test_extract_block_entries() {
        let doc = r#"
port: 7890
mode: rule
proxies:
  - name: a
    type: ss
    server: a.example.com
    port: 8388
    cipher: aes-128-gcm
    password: pw
  - name: b
    type: trojan
    server: b.example.com
    port: 443
    password: pw
proxy-groups:
  - name: auto
    proxies:
      - a
      - b
"#;
        let records = DocumentExtractor::extract(doc, "http://feed");
        assert_eq!(names(&records), vec!["a", "b"]);
        assert_eq!(records[0].port(), Some(8388));
        assert_eq!(records[1].source_feed, "http://feed");
    }

    #[test]
    fn test_extract_flow_entries() {
        let doc = "proxies:\n  - {name: a, type: ss, server: a, port: 1}\n  - {name: b, type: vmess, server: b, port: 2}\n";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_entries_are_isolated() {
        let doc = r#"proxies:
  - {name: good1, type: ss, server: a, port: 1}
  - {name: broken, type: ss, server: [unclosed
  - name: good2
    type: trojan
    server: b
    port: 2
  - name: also-broken
    server: "c
    port: 3
  - {name: good3, type: vless, server: d, port: 4}
"#;
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["good1", "good2", "good3"]);
    }

    #[test]
    fn test_non_mapping_entry_rejected() {
        let doc = "proxies:\n  - just-a-string\n  - {name: a, type: ss, server: a, port: 1}\n";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a"]);
    }

    #[test]
    fn test_empty_section() {
        let doc = "proxies:\nproxy-groups:\n  - name: auto\n";
        assert!(DocumentExtractor::extract(doc, "").is_empty());

        assert!(DocumentExtractor::extract("proxies:\n", "").is_empty());
    }

    #[test]
    fn test_no_marker() {
        let doc = "port: 7890\nrules:\n  - MATCH,DIRECT\n";
        assert!(DocumentExtractor::extract(doc, "").is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let doc = r#"proxies:
# leading comment

  - name: a
    type: ss

    # inside an entry
    server: a
    port: 1
#col0 comment does not end the section
  - {name: b, type: ss, server: b, port: 2}
"#;
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a", "b"]);
    }

    #[test]
    fn test_unindented_items() {
        let doc = "proxies:\n- name: a\n  type: ss\n  server: a\n  port: 1\n- {name: b, type: ss, server: b, port: 2}\nrules: []\n";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a", "b"]);
    }

    #[test]
    fn test_control_characters_stripped() {
        let doc = "proxies:\n  - {name: a\u{0}\u{7}, type: ss, server: a, port: 1}\n  - {name: \u{1b}b, type: ss, server: b, port: 2}\n";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a", "b"]);
    }

    #[test]
    fn test_final_entry_flushed_at_end_of_input() {
        let doc = "proxies:\n  - {name: a, type: ss, server: a, port: 1}\n  - name: last\n    type: ss\n    server: z\n    port: 9";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a", "last"]);
    }

    #[test]
    fn test_truncated_final_entry_dropped() {
        let doc = "proxies:\n  - {name: a, type: ss, server: a, port: 1}\n  - {name: cut, type: ss, ser";
        let records = DocumentExtractor::extract(doc, "");
        assert_eq!(names(&records), vec!["a"]);
    }

    #[test]
    fn test_sanitize_keeps_cjk() {
        assert_eq!(sanitize("香港 node\u{1f1ed}\u{1f1f0}\t1\u{7f}"), "香港 node\t1");
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    - a", 2), "  - a");
        assert_eq!(dedent(" x", 4), "x");
        assert_eq!(dedent("x", 2), "x");
    }
}
