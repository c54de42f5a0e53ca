//! SVG envelope assembly.
//!
//! The serialized clone is wrapped in a `foreignObject` positioned so the
//! source element's origin maps onto the viewBox origin after bleed, with a
//! single `<style>` carrying the deduplicated tag defaults, embedded font
//! faces, overflow unlocks, and the pooled class rules.

mod xhtml;

pub(crate) use xhtml::{serialize_subtree, style_text};

use std::collections::{HashMap, HashSet};

use crate::dom::{Document, NodeId};
use crate::geometry::Frame;
use crate::style::defaults;
use crate::util::encode_uri_component;

/// Keeps paint that escapes the frame (shadows, transforms) visible.
const OVERFLOW_RULES: &str = "svg{overflow:visible;}foreignObject{overflow:visible;}";

/// Assemble the full SVG document text for a compressed clone.
pub(crate) fn build_svg(
    clone: &Document,
    root: NodeId,
    frame: &Frame,
    fonts_css: &str,
    class_css: &str,
) -> String {
    let mut content = String::new();
    serialize_subtree(clone, root, &mut content);

    let mut style = String::new();
    style.push_str(&base_css(clone, root));
    style.push_str(fonts_css);
    style.push_str(OVERFLOW_RULES);
    style.push_str(class_css);

    let pad = frame.pad;
    let mut svg = String::with_capacity(content.len() + style.len() + 512);
    svg.push_str("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"");
    svg.push_str(&fmt_num(frame.out_w));
    svg.push_str("\" height=\"");
    svg.push_str(&fmt_num(frame.out_h));
    svg.push_str("\" viewBox=\"0 0 ");
    svg.push_str(&fmt_num(frame.view_w()));
    svg.push(' ');
    svg.push_str(&fmt_num(frame.view_h()));
    svg.push_str("\"><style>");
    xhtml::push_escaped_text(&mut svg, &style);
    svg.push_str("</style><foreignObject x=\"");
    svg.push_str(&fmt_num(-(frame.vb_min_x - pad)));
    svg.push_str("\" y=\"");
    svg.push_str(&fmt_num(-(frame.vb_min_y - pad)));
    svg.push_str("\" width=\"");
    svg.push_str(&fmt_num(frame.w0 + 2.0 * pad));
    svg.push_str("\" height=\"");
    svg.push_str(&fmt_num(frame.h0 + 2.0 * pad));
    svg.push_str("\" style=\"overflow:visible\">");
    svg.push_str("<div xmlns=\"http://www.w3.org/1999/xhtml\" style=\"width:");
    svg.push_str(&fmt_num(frame.w0));
    svg.push_str("px;height:");
    svg.push_str(&fmt_num(frame.h0));
    svg.push_str("px;overflow:visible\">");
    svg.push_str(&content);
    svg.push_str("</div></foreignObject></svg>");
    svg
}

/// Wrap SVG text as a `data:` URL with the `encodeURIComponent` escape set.
pub(crate) fn to_data_url(svg_text: &str) -> String {
    format!(
        "data:image/svg+xml;charset=utf-8,{}",
        encode_uri_component(svg_text)
    )
}

/// Default styling for every tag used in the clone, grouped so tags with an
/// identical default block share one rule.
fn base_css(clone: &Document, root: NodeId) -> String {
    let mut tags: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for id in clone.descendants(root) {
        if let Some(el) = clone.element(id)
            && seen.insert(el.tag().to_string())
        {
            tags.push(el.tag().to_string());
        }
    }

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for tag in tags {
        let block = style_text(&defaults::baseline_style(&tag));
        match index.get(&block) {
            Some(&i) => groups[i].1.push(tag),
            None => {
                index.insert(block.clone(), groups.len());
                groups.push((block, vec![tag]));
            }
        }
    }

    let mut css = String::new();
    for (block, tags) in &groups {
        css.push_str(&tags.join(","));
        css.push('{');
        css.push_str(block);
        css.push('}');
    }
    css
}

/// Format an SVG attribute number, collapsing near-integers.
fn fmt_num(v: f64) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_100x50() -> Frame {
        Frame {
            w0: 100.0,
            h0: 50.0,
            vb_min_x: 0.0,
            vb_min_y: 0.0,
            vb_w: 100.0,
            vb_h: 50.0,
            out_w: 100.0,
            out_h: 50.0,
            pad: 0.0,
        }
    }

    fn plain_doc() -> (Document, NodeId) {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.append_text(div, "test");
        (doc, div)
    }

    #[test]
    fn test_envelope_dimensions() {
        let (doc, div) = plain_doc();
        let svg = build_svg(&doc, div, &frame_100x50(), "", "");
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"100\" height=\"50\" viewBox=\"0 0 100 50\">"));
        assert!(svg.ends_with("</div></foreignObject></svg>"));
        assert!(svg.contains("<div xmlns=\"http://www.w3.org/1999/xhtml\" style=\"width:100px;height:50px;overflow:visible\"><div>test</div></div>"));
    }

    #[test]
    fn test_foreign_object_counters_bleed_and_pad() {
        let (doc, div) = plain_doc();
        let frame = Frame {
            vb_min_x: -6.0,
            vb_min_y: -4.0,
            vb_w: 120.0,
            vb_h: 70.0,
            out_w: 122.0,
            out_h: 72.0,
            pad: 1.0,
            ..frame_100x50()
        };
        let svg = build_svg(&doc, div, &frame, "", "");
        assert!(svg.contains("<foreignObject x=\"7\" y=\"5\" width=\"102\" height=\"52\" style=\"overflow:visible\">"));
        assert!(svg.contains("viewBox=\"0 0 122 72\""));
    }

    #[test]
    fn test_overflow_rules_present() {
        let (doc, div) = plain_doc();
        let svg = build_svg(&doc, div, &frame_100x50(), "", "");
        assert!(svg.contains("svg{overflow:visible;}foreignObject{overflow:visible;}"));
    }

    #[test]
    fn test_style_section_order() {
        let (doc, div) = plain_doc();
        let svg = build_svg(
            &doc,
            div,
            &frame_100x50(),
            "@font-face{font-family:F;}",
            ".c1{color: red;}",
        );
        let base = svg.find("div{").unwrap();
        let fonts = svg.find("@font-face").unwrap();
        let overflow = svg.find("svg{overflow").unwrap();
        let classes = svg.find(".c1{").unwrap();
        assert!(base < fonts && fonts < overflow && overflow < classes);
    }

    #[test]
    fn test_base_css_groups_identical_defaults() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        let section = doc.create_el("section");
        doc.append(div, section);
        let span = doc.create_el("span");
        doc.append(section, span);

        let css = base_css(&doc, div);
        // div and section share the block default style; span is inline
        assert!(css.contains("div,section{"));
        assert!(css.contains("span{"));
        assert!(css.contains("display: block;"));
    }

    #[test]
    fn test_data_url_prefix_and_encoding() {
        let url = to_data_url("<svg viewBox=\"0 0 1 1\"/>");
        assert!(url.starts_with("data:image/svg+xml;charset=utf-8,"));
        let payload = &url["data:image/svg+xml;charset=utf-8,".len()..];
        assert!(!payload.contains('<'));
        assert!(!payload.contains('"'));
        assert!(payload.contains("%3Csvg"));
    }

    #[test]
    fn test_fractional_numbers_trimmed() {
        assert_eq!(fmt_num(12.0), "12");
        assert_eq!(fmt_num(12.5), "12.5");
        assert_eq!(fmt_num(0.125), "0.125");
        assert_eq!(fmt_num(-7.0), "-7");
    }
}
