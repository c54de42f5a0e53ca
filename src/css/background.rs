//! Background-image value handling.
//!
//! `background-image` is a comma-separated list of layers where each layer
//! may be a `url(...)`, a gradient, or `none`. Layers are split at top-level
//! commas only, so gradient color stops survive intact.

use crate::css::declaration::split_top_level;

/// Split a `background-image` value into its layers.
pub fn split_layers(value: &str) -> Vec<&str> {
    split_top_level(value, ',')
        .into_iter()
        .map(str::trim)
        .filter(|layer| !layer.is_empty())
        .collect()
}

/// Whether a layer is a gradient function.
pub fn is_gradient(layer: &str) -> bool {
    let lower = layer.to_ascii_lowercase();
    ["linear-gradient(", "radial-gradient(", "conic-gradient(", "repeating-"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// A `url(...)` occurrence within a CSS value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSpan {
    /// Byte range of the full `url(...)` token.
    pub start: usize,
    pub end: usize,
    /// The enclosed URL, unquoted and trimmed.
    pub url: String,
}

/// Find every `url(...)` token in a value.
pub fn find_urls(value: &str) -> Vec<UrlSpan> {
    let bytes = value.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i + 4 <= bytes.len() {
        if bytes[i..i + 4].eq_ignore_ascii_case(b"url(") {
            // Preceded by an identifier character means a different function
            let at_boundary = i == 0
                || !(bytes[i - 1].is_ascii_alphanumeric()
                    || bytes[i - 1] == b'-'
                    || bytes[i - 1] == b'_');
            if at_boundary
                && let Some((end, url)) = scan_url_body(value, i + 4)
            {
                spans.push(UrlSpan { start: i, end, url });
                i = end;
                continue;
            }
        }
        i += 1;
    }

    spans
}

/// Scan the body of a `url(` token starting just past the paren. Returns the
/// byte offset past the closing paren and the unquoted URL.
fn scan_url_body(value: &str, body_start: usize) -> Option<(usize, String)> {
    let bytes = value.as_bytes();
    let mut i = body_start;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    while i < bytes.len() {
        let b = bytes[i];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if let Some(q) = quote {
            if b == q {
                quote = None;
            }
        } else if b == b'"' || b == b'\'' {
            quote = Some(b);
        } else if b == b')' {
            let raw = value[body_start..i].trim();
            let url = strip_quotes(raw).to_string();
            return Some((i + 1, url));
        }
        i += 1;
    }
    None
}

/// Strip one layer of matching quotes.
pub fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Rewrite each `url(...)` token in a value.
///
/// The closure receives the enclosed URL and returns the replacement for the
/// whole token, or `None` to keep the original text.
pub fn replace_urls(value: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let spans = find_urls(value);
    if spans.is_empty() {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&value[cursor..span.start]);
        match replace(&span.url) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&value[span.start..span.end]),
        }
        cursor = span.end;
    }
    out.push_str(&value[cursor..]);
    out
}

/// Replace network-reachable `url(...)` references with `none`, keeping
/// `data:` URLs. Applied before style values are used as cache keys, so two
/// elements differing only in a not-yet-inlined URL still share a key.
pub fn neutralize_remote_urls(value: &str) -> String {
    replace_urls(value, |url| {
        if url.starts_with("data:") {
            None
        } else {
            Some("none".to_string())
        }
    })
}

/// Format a URL back into a `url(...)` token with quoting.
pub fn format_url(url: &str) -> String {
    format!("url(\"{}\")", url.replace('\\', "\\\\").replace('"', "\\\""))
}
