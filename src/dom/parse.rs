//! HTML ingestion.
//!
//! Parses markup into the document arena, registers the stylesheets it
//! references, runs the cascade, and assigns layout rectangles. The result
//! is a document ready for capture, equivalent to one a host would hand over
//! with real measurements.

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;

use crate::dom::arena::{Document, NodeId};
use crate::dom::layout;
use crate::dom::node::DocumentStylesheet;
use crate::dom::tree_sink::DocumentSink;
use crate::style::compute_document_styles;

/// Parse an HTML document and resolve styles and layout.
pub fn parse_html(html: &str) -> Document {
    parse_html_with_css(html, "")
}

/// Parse an HTML document with an extra stylesheet appended after the
/// document's own sheets.
pub fn parse_html_with_css(html: &str, css: &str) -> Document {
    let sink = DocumentSink::new();
    let result = parse_document(sink, ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes());
    let mut doc = result.into_document();

    collect_stylesheets(&mut doc);
    if !css.trim().is_empty() {
        doc.add_stylesheet(DocumentStylesheet::inline(css));
    }

    compute_document_styles(&mut doc);
    layout::layout_document(&mut doc);
    doc
}

/// Parse raw HTML bytes, tolerating non-UTF-8 encodings.
pub fn parse_html_bytes(html: &[u8], hint_encoding: Option<&str>) -> Document {
    let text = crate::util::decode_text(html, hint_encoding);
    parse_html(&text)
}

impl Document {
    /// Parse markup into a styled, laid-out document.
    pub fn from_html(html: &str) -> Self {
        parse_html(html)
    }

    /// Parse markup with an additional stylesheet.
    pub fn from_html_with_css(html: &str, css: &str) -> Self {
        parse_html_with_css(html, css)
    }
}

/// Register `<style>` texts and `<link rel="stylesheet">` hrefs on the
/// document, in document order.
fn collect_stylesheets(doc: &mut Document) {
    let mut inline_texts: Vec<String> = Vec::new();
    let mut linked: Vec<(String, bool)> = Vec::new();

    let ids: Vec<NodeId> = doc.descendants(doc.document()).collect();
    for id in ids {
        let Some(el) = doc.element(id) else { continue };
        match el.tag() {
            "style" => {
                let mut text = String::new();
                doc.collect_text(id, &mut text);
                inline_texts.push(text);
            }
            "link" => {
                let is_stylesheet = el
                    .attr("rel")
                    .is_some_and(|rel| rel.eq_ignore_ascii_case("stylesheet"));
                if is_stylesheet
                    && let Some(href) = el.attr("href").filter(|h| !h.is_empty())
                {
                    linked.push((href.to_string(), is_same_origin(doc, href)));
                }
            }
            _ => {}
        }
    }

    for text in inline_texts {
        doc.add_stylesheet(DocumentStylesheet::inline(text));
    }
    for (href, same_origin) in linked {
        // Linked sheet text is unavailable in the static path; the font
        // embedder fetches the href when it needs the rules.
        doc.add_stylesheet(DocumentStylesheet::linked(href, None, same_origin));
    }
}

/// A relative href shares the document origin; an absolute one must match
/// the base URL's host.
fn is_same_origin(doc: &Document, href: &str) -> bool {
    if !href.contains("://") {
        return true;
    }
    match (&doc.base_url, url::Url::parse(href)) {
        (Some(base), Ok(target)) => url::Url::parse(base)
            .ok()
            .is_some_and(|b| b.origin() == target.origin()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolves_styles() {
        let doc = parse_html("<style>p { color: red }</style><p>hi</p>");
        let p = doc.find_by_tag("p").unwrap();
        assert_eq!(doc.element(p).unwrap().style("color"), Some("red"));
    }

    #[test]
    fn test_extra_css_appended_after_document_sheets() {
        let doc = parse_html_with_css(
            "<style>p { color: red }</style><p>hi</p>",
            "p { color: blue }",
        );
        let p = doc.find_by_tag("p").unwrap();
        // Same specificity, later sheet wins
        assert_eq!(doc.element(p).unwrap().style("color"), Some("blue"));
    }

    #[test]
    fn test_linked_sheet_registered_without_text() {
        let doc = parse_html(r#"<link rel="stylesheet" href="https://cdn.test/a.css"><p>x</p>"#);
        let linked: Vec<_> = doc
            .stylesheets
            .iter()
            .filter(|s| s.href.is_some())
            .collect();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].href.as_deref(), Some("https://cdn.test/a.css"));
        assert!(linked[0].text.is_none());
        assert!(!linked[0].same_origin);
    }

    #[test]
    fn test_relative_link_is_same_origin() {
        let doc = parse_html(r#"<link rel="stylesheet" href="style.css"><p>x</p>"#);
        assert!(doc.stylesheets.iter().any(|s| s.same_origin));
    }

    #[test]
    fn test_layout_assigns_rects() {
        let doc = parse_html_with_css("<div>hello</div>", "div { width: 200px; height: 40px }");
        let div = doc.find_by_tag("div").unwrap();
        let rect = doc.element(div).unwrap().rect;
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 40.0);
    }

    #[test]
    fn test_bytes_entry_decodes_latin1() {
        // "café" with 0xE9, malformed as UTF-8
        let bytes = b"<p>caf\xe9</p>";
        let doc = parse_html_bytes(bytes, None);
        let p = doc.find_by_tag("p").unwrap();
        let mut text = String::new();
        doc.collect_text(p, &mut text);
        assert_eq!(text, "café");
    }
}
