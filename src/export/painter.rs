//! CPU rasterization of a retained clone.
//!
//! Paints element boxes into an RGBA buffer: background colors, decodable
//! background-image layers, solid borders, and inlined `<img>` bitmaps,
//! with opacity accumulation and overflow clipping by element rects.
//! Text contributes layout but no pixels; glyph shaping is out of scope.
//! Paint order is document order, so stacking contexts and z-index are
//! approximated by tree position.

use std::collections::HashMap;

use image::RgbaImage;
use log::debug;

use crate::css::background::{find_urls, is_gradient, split_layers};
use crate::css::declaration::split_top_level;
use crate::css::values::{parse_color, parse_px};
use crate::dom::node::{Rect, StyleMap};
use crate::dom::{Document, NodeId};
use crate::fetch::data_url;
use crate::geometry::Frame;

/// Integer device-space clip rectangle, half-open.
#[derive(Debug, Clone, Copy)]
struct Clip {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl Clip {
    fn full(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width as i64,
            y1: height as i64,
        }
    }

    fn intersect(&self, other: Clip) -> Clip {
        Clip {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Paint a compressed clone into a `width` x `height` RGBA buffer.
///
/// `style_map` carries the class-pooled style keys per clone element; the
/// painter resolves each element as key properties overlaid by whatever
/// stayed inline on the element.
pub(crate) fn paint(
    clone: &Document,
    root: NodeId,
    frame: &Frame,
    style_map: &HashMap<NodeId, String>,
    width: u32,
    height: u32,
) -> RgbaImage {
    let mut buf = RgbaImage::new(width.max(1), height.max(1));

    let root_rect = clone.element(root).map(|el| el.rect).unwrap_or_default();
    let painter = Painter {
        clone,
        style_map,
        sx: buf.width() as f64 / frame.view_w().max(1.0),
        sy: buf.height() as f64 / frame.view_h().max(1.0),
        ox: frame.pad - frame.vb_min_x - root_rect.x,
        oy: frame.pad - frame.vb_min_y - root_rect.y,
    };

    let clip = Clip::full(buf.width(), buf.height());
    painter.paint_node(&mut buf, root, clip, 1.0);
    buf
}

struct Painter<'a> {
    clone: &'a Document,
    style_map: &'a HashMap<NodeId, String>,
    sx: f64,
    sy: f64,
    ox: f64,
    oy: f64,
}

impl Painter<'_> {
    fn paint_node(&self, buf: &mut RgbaImage, id: NodeId, clip: Clip, opacity: f64) {
        let Some(el) = self.clone.element(id) else {
            // Text and other non-element nodes paint nothing themselves
            for child in self.clone.children(id) {
                self.paint_node(buf, child, clip, opacity);
            }
            return;
        };

        let style = self.effective_style(id);
        if style.get("display").map(String::as_str) == Some("none") {
            return;
        }

        let opacity = opacity
            * style
                .get("opacity")
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(1.0);

        let rect = el.rect;
        if !rect.is_empty() && opacity > 0.0 {
            self.paint_box(buf, el.tag(), &rect, &style, clip, opacity, el.attr("src"));
        }

        let child_clip = if clips_overflow(&style) && !rect.is_empty() {
            clip.intersect(self.device_clip(&rect))
        } else {
            clip
        };
        if child_clip.is_empty() {
            return;
        }
        for child in self.clone.children(id) {
            self.paint_node(buf, child, child_clip, opacity);
        }
    }

    fn paint_box(
        &self,
        buf: &mut RgbaImage,
        tag: &str,
        rect: &Rect,
        style: &StyleMap,
        clip: Clip,
        opacity: f64,
        src: Option<&str>,
    ) {
        let (x0, y0, x1, y1) = self.device_rect(rect);
        let radius = style
            .get("border-top-left-radius")
            .or_else(|| style.get("border-radius"))
            .and_then(|v| parse_px(v))
            .unwrap_or(0.0)
            * self.sx.min(self.sy);

        if let Some(color) = style.get("background-color").and_then(|v| parse_color(v))
            && color[3] > 0
        {
            fill_rounded(buf, x0, y0, x1, y1, radius, color, opacity, clip);
        }

        if let Some(value) = style.get("background-image") {
            // First layer paints on top, so walk the list back to front
            for layer in split_layers(value).iter().rev() {
                self.paint_background_layer(buf, layer, x0, y0, x1, y1, clip, opacity);
            }
        }

        self.paint_borders(buf, style, x0, y0, x1, y1, clip, opacity);

        if tag == "img"
            && let Some(src) = src
            && let Some(bitmap) = decode_bitmap(src)
        {
            let (cx0, cy0, cx1, cy1) = self.content_box(style, x0, y0, x1, y1);
            draw_bitmap(buf, &bitmap, cx0, cy0, cx1, cy1, clip, opacity);
        }
    }

    fn paint_background_layer(
        &self,
        buf: &mut RgbaImage,
        layer: &str,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        clip: Clip,
        opacity: f64,
    ) {
        if is_gradient(layer) {
            return;
        }
        for span in find_urls(layer) {
            if let Some(bitmap) = decode_bitmap(&span.url) {
                draw_bitmap(buf, &bitmap, x0, y0, x1, y1, clip, opacity);
            }
        }
    }

    fn paint_borders(
        &self,
        buf: &mut RgbaImage,
        style: &StyleMap,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        clip: Clip,
        opacity: f64,
    ) {
        let side = |style: &StyleMap, name: &str| -> Option<(f64, [u8; 4])> {
            if style
                .get(&format!("border-{name}-style"))
                .is_some_and(|s| s == "none" || s == "hidden")
            {
                return None;
            }
            let width = style
                .get(&format!("border-{name}-width"))
                .and_then(|v| parse_px(v))
                .filter(|w| *w > 0.0)?;
            let color = style
                .get(&format!("border-{name}-color"))
                .and_then(|v| parse_color(v))
                .filter(|c| c[3] > 0)?;
            Some((width, color))
        };

        if let Some((w, c)) = side(style, "top") {
            fill_rect(buf, x0, y0, x1, y0 + w * self.sy, c, opacity, clip);
        }
        if let Some((w, c)) = side(style, "bottom") {
            fill_rect(buf, x0, y1 - w * self.sy, x1, y1, c, opacity, clip);
        }
        if let Some((w, c)) = side(style, "left") {
            fill_rect(buf, x0, y0, x0 + w * self.sx, y1, c, opacity, clip);
        }
        if let Some((w, c)) = side(style, "right") {
            fill_rect(buf, x1 - w * self.sx, y0, x1, y1, c, opacity, clip);
        }
    }

    /// Border box inset by border and padding widths, in device pixels.
    fn content_box(
        &self,
        style: &StyleMap,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    ) -> (f64, f64, f64, f64) {
        let inset = |prop: &str| -> f64 {
            style.get(prop).and_then(|v| parse_px(v)).unwrap_or(0.0)
        };
        let left = (inset("border-left-width") + inset("padding-left")) * self.sx;
        let right = (inset("border-right-width") + inset("padding-right")) * self.sx;
        let top = (inset("border-top-width") + inset("padding-top")) * self.sy;
        let bottom = (inset("border-bottom-width") + inset("padding-bottom")) * self.sy;
        (x0 + left, y0 + top, (x1 - right).max(x0 + left), (y1 - bottom).max(y0 + top))
    }

    fn device_rect(&self, rect: &Rect) -> (f64, f64, f64, f64) {
        let x0 = (rect.x + self.ox) * self.sx;
        let y0 = (rect.y + self.oy) * self.sy;
        (x0, y0, x0 + rect.width * self.sx, y0 + rect.height * self.sy)
    }

    fn device_clip(&self, rect: &Rect) -> Clip {
        let (x0, y0, x1, y1) = self.device_rect(rect);
        Clip {
            x0: x0.floor() as i64,
            y0: y0.floor() as i64,
            x1: x1.ceil() as i64,
            y1: y1.ceil() as i64,
        }
    }

    /// Class-key properties overlaid by the element's retained inline map.
    fn effective_style(&self, id: NodeId) -> StyleMap {
        let mut map = StyleMap::new();
        if let Some(key) = self.style_map.get(&id) {
            for pair in split_top_level(key, ';') {
                if let Some((prop, value)) = pair.split_once(':') {
                    let prop = prop.trim();
                    if !prop.is_empty() {
                        map.insert(prop.to_string(), value.trim().to_string());
                    }
                }
            }
        }
        if let Some(el) = self.clone.element(id) {
            for (prop, value) in &el.computed {
                map.insert(prop.clone(), value.clone());
            }
        }
        map
    }
}

fn clips_overflow(style: &StyleMap) -> bool {
    matches!(
        style.get("overflow").map(String::as_str),
        Some("hidden") | Some("clip") | Some("auto") | Some("scroll")
    )
}

/// Decode a data-URL bitmap. Remote URLs were inlined earlier; anything
/// still remote (or vector) yields no pixels.
fn decode_bitmap(src: &str) -> Option<RgbaImage> {
    if !data_url::is_data_url(src) {
        return None;
    }
    let (bytes, _) = data_url::decode(src).ok()?;
    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img.to_rgba8()),
        Err(err) => {
            debug!("undecodable bitmap skipped: {err}");
            None
        }
    }
}

// ============================================================================
// Primitive fills
// ============================================================================

fn fill_rect(
    buf: &mut RgbaImage,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    color: [u8; 4],
    opacity: f64,
    clip: Clip,
) {
    fill_rounded(buf, x0, y0, x1, y1, 0.0, color, opacity, clip);
}

/// Axis-aligned fill with a uniform corner-radius approximation: pixels in
/// the corner squares outside the quarter circle are skipped.
#[allow(clippy::too_many_arguments)]
fn fill_rounded(
    buf: &mut RgbaImage,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    radius: f64,
    color: [u8; 4],
    opacity: f64,
    clip: Clip,
) {
    let alpha = (color[3] as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
    if alpha == 0 {
        return;
    }
    let px0 = (x0.round() as i64).max(clip.x0).max(0);
    let py0 = (y0.round() as i64).max(clip.y0).max(0);
    let px1 = (x1.round() as i64).min(clip.x1).min(buf.width() as i64);
    let py1 = (y1.round() as i64).min(clip.y1).min(buf.height() as i64);
    if px0 >= px1 || py0 >= py1 {
        return;
    }

    let radius = radius.min((x1 - x0) / 2.0).min((y1 - y0) / 2.0).max(0.0);
    let src = [color[0], color[1], color[2], alpha];

    for y in py0..py1 {
        for x in px0..px1 {
            if radius > 0.0 && outside_corner(x as f64 + 0.5, y as f64 + 0.5, x0, y0, x1, y1, radius)
            {
                continue;
            }
            blend_px(buf, x as u32, y as u32, src);
        }
    }
}

/// Whether a point falls in a corner square but outside its quarter circle.
fn outside_corner(px: f64, py: f64, x0: f64, y0: f64, x1: f64, y1: f64, r: f64) -> bool {
    let cx = if px < x0 + r {
        x0 + r
    } else if px > x1 - r {
        x1 - r
    } else {
        return false;
    };
    let cy = if py < y0 + r {
        y0 + r
    } else if py > y1 - r {
        y1 - r
    } else {
        return false;
    };
    let dx = px - cx;
    let dy = py - cy;
    dx * dx + dy * dy > r * r
}

/// Draw a bitmap stretched onto a device-space rectangle (bilinear).
fn draw_bitmap(
    buf: &mut RgbaImage,
    bitmap: &RgbaImage,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    clip: Clip,
    opacity: f64,
) {
    let dst_w = (x1 - x0).round() as i64;
    let dst_h = (y1 - y0).round() as i64;
    if dst_w <= 0 || dst_h <= 0 {
        return;
    }
    let scaled = image::imageops::resize(
        bitmap,
        dst_w as u32,
        dst_h as u32,
        image::imageops::FilterType::Triangle,
    );

    let base_x = x0.round() as i64;
    let base_y = y0.round() as i64;
    for (sx, sy, pixel) in scaled.enumerate_pixels() {
        let dx = base_x + sx as i64;
        let dy = base_y + sy as i64;
        if dx < clip.x0 || dx >= clip.x1 || dy < clip.y0 || dy >= clip.y1 {
            continue;
        }
        if dx < 0 || dy < 0 || dx >= buf.width() as i64 || dy >= buf.height() as i64 {
            continue;
        }
        let mut src = pixel.0;
        src[3] = (src[3] as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
        blend_px(buf, dx as u32, dy as u32, src);
    }
}

/// Source-over blend of one pixel.
fn blend_px(buf: &mut RgbaImage, x: u32, y: u32, src: [u8; 4]) {
    let sa = src[3] as f64 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let dst = buf.get_pixel_mut(x, y);
    let da = dst.0[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = image::Rgba([0, 0, 0, 0]);
        return;
    }
    for i in 0..3 {
        let sc = src[i] as f64 / 255.0;
        let dc = dst.0[i] as f64 / 255.0;
        let out = (sc * sa + dc * da * (1.0 - sa)) / out_a;
        dst.0[i] = (out * 255.0).round() as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}
