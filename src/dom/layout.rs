//! Coarse block-layout measurer.
//!
//! Assigns a border-box [`Rect`] to every element after the cascade, for
//! documents ingested from markup (builder-provided rects are taken as-is).
//! The flow model is deliberately simple: blocks stack vertically, explicit
//! sizes win, padding/border/margin are honored, and text height is
//! estimated from line wrapping at a character width of half the font size.
//! Inline elements receive the box of their own text run, placed at the
//! start of the containing line; no per-word cursor is tracked.

use crate::css::values::parse_px;
use crate::dom::arena::{Document, NodeData, NodeId};
use crate::dom::node::{Rect, StyleMap};

/// Estimated glyph advance as a fraction of font size.
const CHAR_WIDTH_FACTOR: f64 = 0.5;

/// Assign layout rectangles to all elements, starting from the root element
/// with the viewport width as the containing block.
pub fn layout_document(doc: &mut Document) {
    let viewport_w = doc.viewport.0;
    if let Some(root) = doc.root_element() {
        layout_block(doc, root, 0.0, 0.0, viewport_w);
    }
}

/// Resolved box metrics for one element.
#[derive(Debug, Default)]
struct BoxMetrics {
    margin: [f64; 4],
    border: [f64; 4],
    padding: [f64; 4],
    width: Option<f64>,
    height: Option<f64>,
    display: Display,
    out_of_flow: bool,
    font_size: f64,
    line_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Display {
    #[default]
    Block,
    Inline,
    InlineBlock,
    None,
}

/// Sides in top/right/bottom/left order, matching the shorthand expansion.
const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

fn metrics(map: &StyleMap, containing_w: f64) -> BoxMetrics {
    let font_size = map
        .get("font-size")
        .and_then(|v| parse_px(v))
        .unwrap_or(16.0);

    let mut m = BoxMetrics {
        font_size,
        line_height: line_height_px(map, font_size),
        ..BoxMetrics::default()
    };

    for (i, side) in SIDES.iter().enumerate() {
        m.margin[i] = length(map, &format!("margin-{side}"), containing_w);
        m.border[i] = length(map, &format!("border-{side}-width"), containing_w);
        m.padding[i] = length(map, &format!("padding-{side}"), containing_w);
    }

    m.width = sized(map, "width", containing_w);
    m.height = sized(map, "height", containing_w);

    m.display = match map.get("display").map(String::as_str) {
        Some("none") => Display::None,
        Some("inline") => Display::Inline,
        Some("inline-block") | Some("inline-flex") | Some("inline-grid") => Display::InlineBlock,
        _ => Display::Block,
    };
    m.out_of_flow = matches!(
        map.get("position").map(String::as_str),
        Some("absolute") | Some("fixed")
    );
    m
}

fn length(map: &StyleMap, prop: &str, percent_base: f64) -> f64 {
    match map.get(prop) {
        Some(v) => resolve_length(v, percent_base).unwrap_or(0.0),
        None => 0.0,
    }
}

fn sized(map: &StyleMap, prop: &str, percent_base: f64) -> Option<f64> {
    map.get(prop).and_then(|v| resolve_length(v, percent_base))
}

fn resolve_length(value: &str, percent_base: f64) -> Option<f64> {
    let value = value.trim();
    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|p| p / 100.0 * percent_base);
    }
    parse_px(value)
}

/// `line-height` is a multiplier when unitless, a length otherwise, and
/// 1.2em for `normal`.
fn line_height_px(map: &StyleMap, font_size: f64) -> f64 {
    match map.get("line-height").map(String::as_str) {
        None | Some("normal") => font_size * 1.2,
        Some(v) => {
            if let Ok(factor) = v.trim().parse::<f64>() {
                factor * font_size
            } else {
                resolve_length(v, font_size).unwrap_or(font_size * 1.2)
            }
        }
    }
}

/// Lay out one block-level element at `(x, y)` within `avail_w`, writing its
/// rect and recursing into children. Returns the margin-box height consumed
/// in the parent's flow.
fn layout_block(doc: &mut Document, id: NodeId, x: f64, y: f64, avail_w: f64) -> f64 {
    let Some(el) = doc.element(id) else { return 0.0 };
    let m = metrics(&el.computed, avail_w);

    if m.display == Display::None {
        zero_subtree(doc, id);
        return 0.0;
    }

    let border_x = x + m.margin[3];
    let border_y = y + m.margin[0];

    let border_w = match m.width {
        Some(w) => w + m.padding[1] + m.padding[3] + m.border[1] + m.border[3],
        None => match m.display {
            // Shrink-to-fit boxes size from their content estimate
            Display::Inline | Display::InlineBlock => {
                let est = content_width_estimate(doc, id, m.font_size);
                (est + m.padding[1] + m.padding[3] + m.border[1] + m.border[3])
                    .min((avail_w - m.margin[1] - m.margin[3]).max(0.0))
            }
            Display::Block | Display::None => (avail_w - m.margin[1] - m.margin[3]).max(0.0),
        },
    };

    let content_x = border_x + m.border[3] + m.padding[3];
    let content_y = border_y + m.border[0] + m.padding[0];
    let content_w = (border_w - m.padding[1] - m.padding[3] - m.border[1] - m.border[3]).max(0.0);

    let content_h = flow_children(doc, id, content_x, content_y, content_w, &m);

    let border_h = match m.height {
        Some(h) => h + m.padding[0] + m.padding[2] + m.border[0] + m.border[2],
        None => content_h + m.padding[0] + m.padding[2] + m.border[0] + m.border[2],
    };

    if let Some(el) = doc.element_mut(id) {
        el.rect = Rect::new(border_x, border_y, border_w, border_h);
    }

    if m.out_of_flow {
        return 0.0;
    }
    m.margin[0] + border_h + m.margin[2]
}

/// Stack child boxes vertically; merge consecutive inline-level children
/// (elements and text) into wrapped runs. Returns the content height.
fn flow_children(
    doc: &mut Document,
    id: NodeId,
    content_x: f64,
    content_y: f64,
    content_w: f64,
    parent: &BoxMetrics,
) -> f64 {
    let children: Vec<NodeId> = doc.children(id).collect();
    let mut cursor_y = content_y;
    let mut run_chars = 0.0_f64;
    let mut run_members: Vec<NodeId> = Vec::new();

    for child in children {
        enum Kind {
            Text(f64),
            InlineEl,
            BlockEl,
            Skip,
        }
        let kind = match doc.get(child).map(|n| &n.data) {
            Some(NodeData::Text(s)) => {
                let count = s.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>();
                Kind::Text(count.saturating_sub(1) as f64)
            }
            Some(NodeData::Element(el)) => match el.computed.get("display").map(String::as_str) {
                Some("inline") | Some("inline-block") | Some("inline-flex")
                | Some("inline-grid") => Kind::InlineEl,
                Some("none") => Kind::Skip,
                _ => Kind::BlockEl,
            },
            _ => Kind::Skip,
        };

        match kind {
            Kind::Text(chars) => run_chars += chars,
            Kind::InlineEl => {
                run_members.push(child);
                let mut text = String::new();
                doc.collect_text(child, &mut text);
                run_chars += text.chars().count() as f64;
            }
            Kind::BlockEl => {
                cursor_y += flush_run(
                    doc,
                    &mut run_chars,
                    &mut run_members,
                    content_x,
                    cursor_y,
                    content_w,
                    parent,
                );
                cursor_y += layout_block(doc, child, content_x, cursor_y, content_w);
            }
            Kind::Skip => {
                if doc.is_element(child) {
                    zero_subtree(doc, child);
                }
            }
        }
    }

    cursor_y += flush_run(
        doc,
        &mut run_chars,
        &mut run_members,
        content_x,
        cursor_y,
        content_w,
        parent,
    );
    cursor_y - content_y
}

/// Close an inline run: estimate wrapped height, and give each inline member
/// a rect at the run origin sized to its own text.
fn flush_run(
    doc: &mut Document,
    run_chars: &mut f64,
    run_members: &mut Vec<NodeId>,
    x: f64,
    y: f64,
    content_w: f64,
    parent: &BoxMetrics,
) -> f64 {
    if *run_chars == 0.0 && run_members.is_empty() {
        return 0.0;
    }
    let char_w = parent.font_size * CHAR_WIDTH_FACTOR;
    let run_w = *run_chars * char_w;
    let lines = if content_w > 0.0 {
        (run_w / content_w).ceil().max(1.0)
    } else {
        1.0
    };
    let height = lines * parent.line_height;

    for &member in run_members.iter() {
        let mut text = String::new();
        doc.collect_text(member, &mut text);
        let w = (text.chars().count() as f64 * char_w).min(content_w);
        let member_lines = if content_w > 0.0 {
            ((text.chars().count() as f64 * char_w) / content_w).ceil().max(1.0)
        } else {
            1.0
        };
        let rect = Rect::new(x, y, w, member_lines * parent.line_height);
        if let Some(el) = doc.element_mut(member) {
            el.rect = rect;
        }
        // Nested inline descendants share the member's box
        let descendants: Vec<NodeId> = doc.descendants(member).skip(1).collect();
        for d in descendants {
            if let Some(el) = doc.element_mut(d) {
                el.rect = rect;
            }
        }
    }

    *run_chars = 0.0;
    run_members.clear();
    height
}

/// Shrink-to-fit estimate: the longest unwrapped text line of the subtree.
fn content_width_estimate(doc: &Document, id: NodeId, font_size: f64) -> f64 {
    let mut text = String::new();
    doc.collect_text(id, &mut text);
    text.chars().count() as f64 * font_size * CHAR_WIDTH_FACTOR
}

fn zero_subtree(doc: &mut Document, id: NodeId) {
    let ids: Vec<NodeId> = doc.descendants(id).collect();
    for d in ids {
        if let Some(el) = doc.element_mut(d) {
            el.rect = Rect::default();
        }
    }
}
