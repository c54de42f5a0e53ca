//! Pseudo-element synthesis.
//!
//! Rendered `::before`/`::after`/`::first-letter` slots have no node to
//! clone, so they materialize as `<span data-snapdom-pseudo="...">` carrying
//! the pseudo's computed style. The `content` value drives what goes inside:
//! quoted strings (with CSS escapes) become text, `url(...)` becomes a
//! nested `<img>` the image inliner later resolves.

use crate::capture::CaptureSession;
use crate::css::background::strip_quotes;
use crate::dom::node::{PseudoKind, StyleMap};
use crate::dom::{Document, NodeId};

/// Attribute marking synthesized pseudo-element spans.
pub(crate) const PSEUDO_ATTR: &str = "data-snapdom-pseudo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentPiece {
    Text(String),
    Image(String),
}

/// Parse a computed `content` value into renderable pieces. `none`,
/// `normal`, and values with nothing renderable yield an empty list.
pub(crate) fn parse_content(value: &str) -> Vec<ContentPiece> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" || trimmed == "normal" {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut chars = trimmed.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            '"' | '\'' => {
                chars.next();
                let mut raw = String::new();
                for (_, sc) in chars.by_ref() {
                    if sc == c {
                        break;
                    }
                    raw.push(sc);
                }
                pieces.push(ContentPiece::Text(unescape_css_string(&raw)));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                // Bare token: consume through balanced parens.
                let mut depth = 0usize;
                let mut end = trimmed.len();
                for (i, tc) in chars.by_ref() {
                    match tc {
                        '(' => depth += 1,
                        ')' => depth = depth.saturating_sub(1),
                        c if c.is_whitespace() && depth == 0 => {
                            end = i;
                            break;
                        }
                        _ => {}
                    }
                    end = i + tc.len_utf8();
                }
                let token = &trimmed[start..end];
                if let Some(inner) = token
                    .strip_prefix("url(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    pieces.push(ContentPiece::Image(strip_quotes(inner.trim()).to_string()));
                }
                // attr(), counter(), open-quote and other tokens have no
                // static rendering here and are skipped.
            }
        }
    }
    pieces
}

/// Decode CSS string escapes: `\\`, `\"`, and `\XXXXXX ` hex escapes.
fn unescape_css_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => break,
            Some(next) if next.is_ascii_hexdigit() => {
                let mut hex = String::new();
                while hex.len() < 6
                    && let Some(&h) = chars.peek()
                    && h.is_ascii_hexdigit()
                {
                    hex.push(h);
                    chars.next();
                }
                // A single whitespace terminates the escape and is consumed.
                if chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if let Ok(code) = u32::from_str_radix(&hex, 16)
                    && let Some(ch) = char::from_u32(code)
                {
                    out.push(ch);
                }
            }
            Some(_) => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
        }
    }
    out
}

/// Materialize one pseudo slot under its cloned owner. No-op when the
/// content has nothing renderable.
pub(crate) fn synthesize_pseudo(
    clone: &mut Document,
    owner: NodeId,
    kind: PseudoKind,
    style: &StyleMap,
    session: &mut CaptureSession<'_>,
    in_shadow: bool,
) {
    let content = style.get("content").map(String::as_str).unwrap_or("none");
    let pieces = parse_content(content);
    if pieces.is_empty() {
        return;
    }

    let span = clone.create_el("span");
    clone.set_attr(span, PSEUDO_ATTR, kind.as_selector());
    for piece in &pieces {
        match piece {
            ContentPiece::Text(text) => clone.append_text(span, text),
            ContentPiece::Image(url) => {
                let img = clone.create_el("img");
                clone.set_attr(img, "src", url);
                clone.append(span, img);
            }
        }
    }

    let mut map = style.clone();
    map.remove("content");
    if let Some(el) = clone.element_mut(span) {
        el.computed = map;
    }

    if in_shadow {
        session.shadow_scoped.insert(span);
    } else {
        let key = session.runtime.style_key_for_map("span", style);
        session.style_map.insert(span, key);
    }

    match kind {
        PseudoKind::After => clone.append(owner, span),
        PseudoKind::Before | PseudoKind::FirstLetter => clone.insert_first(owner, span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_and_normal_are_empty() {
        assert!(parse_content("none").is_empty());
        assert!(parse_content("normal").is_empty());
        assert!(parse_content("").is_empty());
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(
            parse_content("\"hello\""),
            vec![ContentPiece::Text("hello".to_string())]
        );
        assert_eq!(
            parse_content("'single'"),
            vec![ContentPiece::Text("single".to_string())]
        );
    }

    #[test]
    fn test_unicode_escape() {
        assert_eq!(
            parse_content("\"\\2014 dash\""),
            vec![ContentPiece::Text("\u{2014}dash".to_string())]
        );
        assert_eq!(
            parse_content("\"\\201C\\201D\""),
            vec![ContentPiece::Text("\u{201C}\u{201D}".to_string())]
        );
    }

    #[test]
    fn test_escaped_quote_and_backslash() {
        assert_eq!(
            parse_content(r#""a\"b\\c""#),
            vec![ContentPiece::Text("a\"b\\c".to_string())]
        );
    }

    #[test]
    fn test_url_becomes_image() {
        assert_eq!(
            parse_content("url(icon.png)"),
            vec![ContentPiece::Image("icon.png".to_string())]
        );
        assert_eq!(
            parse_content("url(\"https://x.test/i.svg\")"),
            vec![ContentPiece::Image("https://x.test/i.svg".to_string())]
        );
    }

    #[test]
    fn test_mixed_pieces_and_ignored_tokens() {
        assert_eq!(
            parse_content("\"> \" url(arrow.png) attr(data-label) counter(item)"),
            vec![
                ContentPiece::Text("> ".to_string()),
                ContentPiece::Image("arrow.png".to_string()),
            ]
        );
    }
}
