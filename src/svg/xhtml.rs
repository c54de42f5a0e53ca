//! XHTML serialization of the capture clone.
//!
//! foreignObject content is parsed as XML, so the serializer emits strict
//! XHTML: escaped text, quoted attributes, self-closed empty elements, and
//! no comments. Attribute names a framework left behind that would not
//! survive an XML parse are dropped.

use crate::dom::arena::NodeData;
use crate::dom::node::StyleMap;
use crate::dom::{Document, NodeId};

/// Serialize a subtree, appending to `out`.
pub(crate) fn serialize_subtree(doc: &Document, root: NodeId, out: &mut String) {
    let Some(node) = doc.get(root) else {
        return;
    };
    match &node.data {
        NodeData::Element(_) => serialize_element(doc, root, out),
        NodeData::Text(text) => push_escaped_text(out, text),
        NodeData::Comment(_) | NodeData::Doctype { .. } => {}
        NodeData::Document | NodeData::Fragment | NodeData::ShadowRoot => {
            for child in doc.children(root) {
                serialize_subtree(doc, child, out);
            }
        }
    }
}

fn serialize_element(doc: &Document, id: NodeId, out: &mut String) {
    let Some(el) = doc.element(id) else {
        return;
    };
    let tag = el.tag();

    out.push('<');
    out.push_str(tag);

    for attr in &el.attrs {
        let name = attr.name.local.as_ref();
        if !keep_attr(name) {
            continue;
        }
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        push_escaped_attr(out, &attr.value);
        out.push('"');
    }

    // The retained computed map is what survives compression: the preserved
    // background-image for classed elements, the non-default subset for
    // shadow-scoped ones, the full map for synthesized elements.
    let style = style_text(&el.computed);
    if !style.is_empty() {
        out.push_str(" style=\"");
        push_escaped_attr(out, &style);
        out.push('"');
    }

    if doc.children(id).next().is_none() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in doc.children(id) {
        serialize_subtree(doc, child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Whether an attribute survives XHTML serialization.
///
/// Raw `style` attributes are dropped; the style attribute is rebuilt from
/// the computed map. Framework directive names (`@click`, `:bound`, `x-data`,
/// `v-model`, `on:click`, `bind:value`, `let:item`, `class:active`) and any
/// other prefixed name without a declared namespace would make the XML
/// invalid, so they are dropped too. `xml:` and `xmlns` prefixes are always
/// bound.
fn keep_attr(name: &str) -> bool {
    if name == "style" {
        return false;
    }
    let Some(first) = name.chars().next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    if name.starts_with("x-") || name.starts_with("v-") {
        return false;
    }
    match name.split_once(':') {
        Some((prefix, _)) => matches!(prefix, "xml" | "xmlns"),
        None => true,
    }
}

/// Serialize a style map as `prop: value;` pairs, the same shape style keys
/// use.
pub(crate) fn style_text(map: &StyleMap) -> String {
    let mut out = String::with_capacity(map.len() * 24);
    for (prop, value) in map {
        out.push_str(prop);
        out.push_str(": ");
        out.push_str(value);
        out.push(';');
    }
    out
}

// ============================================================================
// Escaping
// ============================================================================

pub(crate) fn push_escaped_text(out: &mut String, text: &str) {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = memchr::memchr3(b'&', b'<', b'>', &bytes[from..]) {
        let at = from + pos;
        out.push_str(&text[from..at]);
        out.push_str(match bytes[at] {
            b'&' => "&amp;",
            b'<' => "&lt;",
            _ => "&gt;",
        });
        from = at + 1;
    }
    out.push_str(&text[from..]);
}

fn push_escaped_attr(out: &mut String, value: &str) {
    let bytes = value.as_bytes();
    let mut from = 0;
    while let Some(pos) = memchr::memchr3(b'&', b'<', b'"', &bytes[from..]) {
        let at = from + pos;
        out.push_str(&value[from..at]);
        out.push_str(match bytes[at] {
            b'&' => "&amp;",
            b'<' => "&lt;",
            _ => "&quot;",
        });
        from = at + 1;
    }
    out.push_str(&value[from..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(doc: &Document, root: NodeId) -> String {
        let mut out = String::new();
        serialize_subtree(doc, root, &mut out);
        out
    }

    #[test]
    fn test_element_with_text_child() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.append_text(div, "hello");
        assert_eq!(serialize(&doc, div), "<div>hello</div>");
    }

    #[test]
    fn test_empty_element_self_closes() {
        let mut doc = Document::new();
        let img = doc.create_el("img");
        doc.append(doc.document(), img);
        doc.set_attr(img, "src", "data:,x");
        assert_eq!(serialize(&doc, img), "<img src=\"data:,x\"/>");
    }

    #[test]
    fn test_text_escaped() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.append_text(div, "a < b & c > d");
        assert_eq!(serialize(&doc, div), "<div>a &lt; b &amp; c &gt; d</div>");
    }

    #[test]
    fn test_attr_value_escaped() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.set_attr(div, "title", "say \"hi\" & <go>");
        assert_eq!(
            serialize(&doc, div),
            "<div title=\"say &quot;hi&quot; &amp; &lt;go>\"/>"
        );
    }

    #[test]
    fn test_comments_stripped() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        let comment = doc.create_comment("secret".to_string());
        doc.append(div, comment);
        doc.append_text(div, "x");
        assert_eq!(serialize(&doc, div), "<div>x</div>");
    }

    #[test]
    fn test_framework_attributes_dropped() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.set_attr(div, "@click", "go()");
        doc.set_attr(div, ":bound", "value");
        doc.set_attr(div, "v-model", "name");
        doc.set_attr(div, "x-data", "{}");
        doc.set_attr(div, "on:click", "handle");
        doc.set_attr(div, "bind:value", "v");
        doc.set_attr(div, "let:item", "i");
        doc.set_attr(div, "class:active", "is");
        doc.set_attr(div, "data-kept", "yes");
        doc.set_attr(div, "aria-label", "ok");
        assert_eq!(
            serialize(&doc, div),
            "<div data-kept=\"yes\" aria-label=\"ok\"/>"
        );
    }

    #[test]
    fn test_undeclared_prefix_dropped_xml_kept() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.set_attr(div, "xlink:href", "#a");
        doc.set_attr(div, "xml:lang", "en");
        assert_eq!(serialize(&doc, div), "<div xml:lang=\"en\"/>");
    }

    #[test]
    fn test_computed_map_becomes_style_attribute() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        if let Some(el) = doc.element_mut(div) {
            el.computed
                .insert("color".to_string(), "red".to_string());
            el.computed
                .insert("width".to_string(), "10px".to_string());
        }
        assert_eq!(
            serialize(&doc, div),
            "<div style=\"color: red;width: 10px;\"/>"
        );
    }

    #[test]
    fn test_raw_style_attribute_replaced_by_computed() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.set_attr(div, "style", "color: green");
        if let Some(el) = doc.element_mut(div) {
            el.computed
                .insert("color".to_string(), "red".to_string());
        }
        assert_eq!(serialize(&doc, div), "<div style=\"color: red;\"/>");
    }

    #[test]
    fn test_nested_structure_and_class() {
        let mut doc = Document::new();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        doc.set_attr(div, "class", "c1");
        let span = doc.create_el("span");
        doc.append(div, span);
        doc.append_text(span, "in");
        assert_eq!(
            serialize(&doc, div),
            "<div class=\"c1\"><span>in</span></div>"
        );
    }
}
