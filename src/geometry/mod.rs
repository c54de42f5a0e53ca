//! Capture frame geometry.
//!
//! Turns the source root's layout box, transform, and paint overflow into
//! the numbers the assembler and exporters consume: the source box
//! (`w0`/`h0`), the viewBox bounds after transform and bleed expansion,
//! the output dimensions, and the safety pad.

mod matrix;

pub use matrix::{Matrix2D, parse_transform};
pub(crate) use matrix::composed_transform;

use std::collections::HashSet;

use crate::css::declaration::split_top_level;
use crate::css::values::parse_px;
use crate::dom::node::{ElementData, StyleMap};
use crate::dom::{Document, NodeId};
use crate::options::CaptureOptions;

/// Slack added when clamping the height to the kept-children span.
const SPAN_EPSILON: f64 = 1.0;

/// Pixels a gaussian blur is assumed to spread per side, per radius unit.
const BLUR_SPREAD_FACTOR: f64 = 2.0;

// ============================================================================
// Frame
// ============================================================================

/// Resolved capture geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Source border-box width/height in CSS pixels, at least 1.
    pub w0: f64,
    pub h0: f64,
    /// Bounding box of the (possibly transformed) root, origin-relative,
    /// already expanded by bleed.
    pub vb_min_x: f64,
    pub vb_min_y: f64,
    pub vb_w: f64,
    pub vb_h: f64,
    /// Output dimensions of the SVG element.
    pub out_w: f64,
    pub out_h: f64,
    /// Safety pad around the foreignObject.
    pub pad: f64,
}

impl Frame {
    /// viewBox width including the pad on both sides.
    pub fn view_w(&self) -> f64 {
        self.vb_w + 2.0 * self.pad
    }

    /// viewBox height including the pad on both sides.
    pub fn view_h(&self) -> f64 {
        self.vb_h + 2.0 * self.pad
    }
}

/// Compute the frame for a capture of `root`. `pruned` carries the source
/// nodes dropped by remove-mode exclusion; a non-empty set triggers the
/// kept-children height clamp.
pub(crate) fn compute_frame(
    src: &Document,
    root: NodeId,
    pruned: &HashSet<NodeId>,
    options: &CaptureOptions,
) -> Frame {
    let Some(el) = src.element(root) else {
        return fallback_frame(options);
    };

    let w0 = axis_size(el, "width").round().max(1.0);
    let mut h0 = axis_size(el, "height").round().max(1.0);

    if !pruned.is_empty() {
        h0 = clamp_to_kept_span(src, root, pruned, h0);
    }

    let matrix = composed_transform(&el.computed);
    let (bx0, by0, bx1, by1) = if !options.outer_transforms {
        matrix.without_translate_rotate().map_bounds(w0, h0, 0.0, 0.0)
    } else if !matrix.is_identity() {
        let (ox, oy) = transform_origin(&el.computed, w0, h0);
        matrix.map_bounds(w0, h0, ox, oy)
    } else {
        (0.0, 0.0, w0, h0)
    };

    let bleed = if options.outer_shadows {
        bleed_of(&el.computed)
    } else {
        Bleed::default()
    };

    let vb_min_x = bx0 - bleed.left;
    let vb_min_y = by0 - bleed.top;
    let vb_w = (bx1 + bleed.right) - vb_min_x;
    let vb_h = (by1 + bleed.bottom) - vb_min_y;

    let mut pad = 0.0;
    if src.ua_profile.needs_foreign_object_pad() {
        pad += 1.0;
    }
    if !options.outer_transforms {
        pad += 1.0;
    }

    let (out_w, out_h) = output_dims(options, w0, h0, vb_w + 2.0 * pad, vb_h + 2.0 * pad);

    Frame {
        w0,
        h0,
        vb_min_x,
        vb_min_y,
        vb_w,
        vb_h,
        out_w,
        out_h,
        pad,
    }
}

fn fallback_frame(options: &CaptureOptions) -> Frame {
    let (out_w, out_h) = output_dims(options, 1.0, 1.0, 1.0, 1.0);
    Frame {
        w0: 1.0,
        h0: 1.0,
        vb_min_x: 0.0,
        vb_min_y: 0.0,
        vb_w: 1.0,
        vb_h: 1.0,
        out_w,
        out_h,
        pad: 0.0,
    }
}

/// Layout rect wins; computed style is the fallback; a unitless 1 closes
/// the chain so empty elements still produce a frame.
fn axis_size(el: &ElementData, prop: &str) -> f64 {
    let from_rect = if prop == "width" {
        el.rect.width
    } else {
        el.rect.height
    };
    if from_rect > 0.0 {
        return from_rect;
    }
    el.style(prop).and_then(parse_px).filter(|v| *v > 0.0).unwrap_or(1.0)
}

/// Output dims follow explicit options; a single axis preserves the source
/// aspect; with neither set the SVG renders at its natural (viewBox) size.
fn output_dims(
    options: &CaptureOptions,
    w0: f64,
    h0: f64,
    natural_w: f64,
    natural_h: f64,
) -> (f64, f64) {
    match (options.width, options.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, (w * h0 / w0).round()),
        (None, Some(h)) => ((h * w0 / h0).round(), h),
        (None, None) => (natural_w, natural_h),
    }
}

// ============================================================================
// Kept-children span
// ============================================================================

/// After remove-mode pruning the source layout still reflects the dropped
/// children, so the height is clamped to the span the kept in-flow children
/// actually cover, plus the root's own vertical chrome.
fn clamp_to_kept_span(src: &Document, root: NodeId, pruned: &HashSet<NodeId>, h0: f64) -> f64 {
    let mut min_top = f64::INFINITY;
    let mut max_bottom = f64::NEG_INFINITY;

    for child in src.children(root) {
        let Some(el) = src.element(child) else {
            continue;
        };
        if pruned.contains(&child) || !in_flow(el) || el.rect.is_empty() {
            continue;
        }
        min_top = min_top.min(el.rect.y);
        max_bottom = max_bottom.max(el.rect.bottom());
    }

    let span = if max_bottom > min_top {
        max_bottom - min_top
    } else {
        0.0
    };

    let chrome = vertical_chrome(src, root);
    h0.min((chrome + span + SPAN_EPSILON).round()).max(1.0)
}

fn in_flow(el: &ElementData) -> bool {
    if el.style("display") == Some("none") {
        return false;
    }
    !matches!(el.style("position"), Some("absolute") | Some("fixed"))
}

fn vertical_chrome(src: &Document, root: NodeId) -> f64 {
    let Some(el) = src.element(root) else {
        return 0.0;
    };
    [
        "border-top-width",
        "border-bottom-width",
        "padding-top",
        "padding-bottom",
    ]
    .iter()
    .filter_map(|prop| el.style(prop).and_then(parse_px))
    .sum()
}

// ============================================================================
// Transform origin
// ============================================================================

/// Resolve `transform-origin` to pixels, defaulting to the box center.
fn transform_origin(map: &StyleMap, width: f64, height: f64) -> (f64, f64) {
    let value = map
        .get("transform-origin")
        .map(String::as_str)
        .unwrap_or("50% 50%");
    let mut parts = value.split_whitespace();
    let x = origin_component(parts.next().unwrap_or("50%"), width);
    let y = origin_component(parts.next().unwrap_or("50%"), height);
    (x, y)
}

fn origin_component(token: &str, extent: f64) -> f64 {
    match token {
        "left" | "top" => 0.0,
        "right" | "bottom" => extent,
        "center" => extent / 2.0,
        _ => {
            if let Some(pct) = token.strip_suffix('%') {
                pct.trim()
                    .parse::<f64>()
                    .map(|p| p / 100.0 * extent)
                    .unwrap_or(extent / 2.0)
            } else {
                parse_px(token).unwrap_or(extent / 2.0)
            }
        }
    }
}

// ============================================================================
// Bleed
// ============================================================================

/// Per-side paint overflow. Sides combine by maximum: the viewBox needs to
/// contain the farthest-reaching effect, not their sum.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Bleed {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Bleed {
    fn grow(&mut self, top: f64, right: f64, bottom: f64, left: f64) {
        self.top = self.top.max(top.max(0.0));
        self.right = self.right.max(right.max(0.0));
        self.bottom = self.bottom.max(bottom.max(0.0));
        self.left = self.left.max(left.max(0.0));
    }

    fn grow_uniform(&mut self, amount: f64) {
        self.grow(amount, amount, amount, amount);
    }
}

/// Accumulate bleed from box-shadow, blur and drop-shadow filters, and a
/// visible outline.
pub(crate) fn bleed_of(map: &StyleMap) -> Bleed {
    let mut bleed = Bleed::default();

    if let Some(shadows) = map.get("box-shadow") {
        for layer in split_top_level(shadows, ',') {
            shadow_bleed(layer, &mut bleed);
        }
    }

    if let Some(filter) = map.get("filter") {
        filter_bleed(filter, &mut bleed);
    }

    let outline_visible = !matches!(map.get("outline-style").map(String::as_str), None | Some("none"));
    if outline_visible
        && let Some(width) = map.get("outline-width").and_then(|v| parse_px(v))
    {
        bleed.grow_uniform(width);
    }

    bleed
}

/// One box-shadow layer: `[inset] <ox> <oy> [blur [spread]] <color>`.
/// Inset shadows paint inward and contribute nothing.
fn shadow_bleed(layer: &str, bleed: &mut Bleed) {
    let tokens = top_level_tokens(layer);
    if tokens.iter().any(|t| t.eq_ignore_ascii_case("inset")) {
        return;
    }
    let lengths: Vec<f64> = tokens.iter().filter_map(|t| numeric_px(t)).collect();
    if lengths.len() < 2 {
        return;
    }
    let ox = lengths[0];
    let oy = lengths[1];
    let blur = lengths.get(2).copied().unwrap_or(0.0);
    let spread = lengths.get(3).copied().unwrap_or(0.0);
    let reach = blur + spread;
    bleed.grow(reach - oy, reach + ox, reach + oy, reach - ox);
}

/// `filter` function list; only `blur()` and `drop-shadow()` overflow.
fn filter_bleed(value: &str, bleed: &mut Bleed) {
    let mut rest = value;
    while let Some(open) = rest.find('(') {
        let name = rest[..open].trim().rsplit(' ').next().unwrap_or("").to_ascii_lowercase();
        // Color args nest parens, so the close must match by depth.
        let Some(close) = matching_close(rest, open) else {
            return;
        };
        let args = &rest[open + 1..close];
        match name.as_str() {
            "blur" => {
                if let Some(radius) = parse_px(args.trim()) {
                    bleed.grow_uniform(radius * BLUR_SPREAD_FACTOR);
                }
            }
            "drop-shadow" => {
                let lengths: Vec<f64> = top_level_tokens(args)
                    .iter()
                    .filter_map(|t| numeric_px(t))
                    .collect();
                if lengths.len() >= 2 {
                    let ox = lengths[0];
                    let oy = lengths[1];
                    let blur = lengths.get(2).copied().unwrap_or(0.0);
                    bleed.grow(blur - oy, blur + ox, blur + oy, blur - ox);
                }
            }
            _ => {}
        }
        rest = &rest[close + 1..];
    }
}

pub(crate) fn matching_close(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on whitespace outside parens, so `rgb(0, 0, 0)` stays one token.
fn top_level_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&value[s..i]);
                }
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&value[s..]);
    }
    tokens
}

/// A shadow length token, rejecting colors and keywords.
fn numeric_px(token: &str) -> Option<f64> {
    let first = token.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    parse_px(token)
}
