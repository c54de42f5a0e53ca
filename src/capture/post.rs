//! Scroll-state flattening.
//!
//! A snapshot has no scrolling, so scrolled containers and stuck sticky
//! elements must bake their current offsets into geometry. Sticky elements
//! turn into absolutely positioned overlays (leaving an invisible placeholder
//! in the flow), then every scrolled container wraps its children in a div
//! translated by the negative scroll offset. The overlay coordinates include
//! the scroll offset so the two shifts compose.

use crate::css::values::parse_px;
use crate::dom::{Document, NodeId};
use crate::style::format_px;

use super::CaptureSession;
use super::clone::make_spacer;

/// Apply both passes under `root`. Sticky overlays must settle before the
/// wrap pass moves children around.
pub(crate) fn apply_scroll_state(
    clone: &mut Document,
    root: NodeId,
    session: &mut CaptureSession<'_>,
) {
    overlay_sticky_elements(clone, root, session);
    wrap_scrolled_containers(clone, root);
}

// ============================================================================
// Sticky Overlays
// ============================================================================

fn is_sticky(clone: &Document, id: NodeId) -> bool {
    clone
        .element(id)
        .and_then(|el| el.style("position"))
        .is_some_and(|p| p == "sticky" || p == "-webkit-sticky")
}

/// Nearest ancestor (root included) with a nonzero scroll offset.
fn scrolled_ancestor(clone: &Document, id: NodeId, root: NodeId) -> Option<NodeId> {
    let mut current = clone.get(id)?.parent;
    loop {
        if let Some(el) = clone.element(current)
            && (el.scroll_left != 0.0 || el.scroll_top != 0.0)
        {
            return Some(current);
        }
        if current == root {
            return None;
        }
        current = clone.get(current)?.parent;
    }
}

/// Convert sticky elements inside scrolled containers into absolute
/// overlays. An untouched sticky element renders at its static position,
/// which is already right when nothing around it is scrolled.
fn overlay_sticky_elements(clone: &mut Document, root: NodeId, session: &mut CaptureSession<'_>) {
    let stuck: Vec<(NodeId, NodeId)> = clone
        .descendants(root)
        .filter(|&id| id != root && is_sticky(clone, id))
        .filter_map(|id| scrolled_ancestor(clone, id, root).map(|container| (id, container)))
        .collect();

    for (id, container) in stuck {
        let Some(el) = clone.element(id) else { continue };
        let Some(holder) = clone.element(container) else {
            continue;
        };

        let scroll_left = holder.scroll_left;
        let scroll_top = holder.scroll_top;
        let container_rect = holder.rect;
        let rect = el.rect;

        // Content-coordinate top: the configured inset plus the scroll
        // offset, so the wrap translation lands it at the stuck position.
        let top = if let Some(inset) = el.style("top").and_then(parse_px) {
            inset + scroll_top
        } else if let Some(inset) = el.style("bottom").and_then(parse_px) {
            container_rect.height - inset - rect.height + scroll_top
        } else {
            rect.y - container_rect.y + scroll_top
        };
        let left = rect.x - container_rect.x + scroll_left;

        let placeholder = make_spacer(clone, rect.width, rect.height);
        clone.insert_before(id, placeholder);

        if let Some(el) = clone.element_mut(id) {
            el.computed
                .insert("position".to_string(), "absolute".to_string());
            el.computed.insert("top".to_string(), format_px(top));
            el.computed.insert("left".to_string(), format_px(left));
            el.computed.remove("bottom");
            el.computed.remove("right");
        }
        session.record_style_from(clone, id);
    }
}

// ============================================================================
// Scrolled Containers
// ============================================================================

/// Wrap each scrolled container's children in a div translated by the
/// negative scroll offset. The transform also makes the wrapper the
/// containing block for the sticky overlays inside it.
fn wrap_scrolled_containers(clone: &mut Document, root: NodeId) {
    let containers: Vec<NodeId> = clone
        .descendants(root)
        .filter(|&id| {
            clone
                .element(id)
                .is_some_and(|el| el.scroll_left != 0.0 || el.scroll_top != 0.0)
                && clone.children(id).next().is_some()
        })
        .collect();

    for container in containers {
        let (scroll_left, scroll_top) = match clone.element(container) {
            Some(el) => (el.scroll_left, el.scroll_top),
            None => continue,
        };

        let wrap = clone.create_el("div");
        if let Some(el) = clone.element_mut(wrap) {
            el.computed.insert(
                "transform".to_string(),
                format!(
                    "translate({}, {})",
                    format_px(-scroll_left),
                    format_px(-scroll_top)
                ),
            );
        }

        let children: Vec<NodeId> = clone.children(container).collect();
        for child in children {
            clone.detach(child);
            clone.append(wrap, child);
        }
        clone.append(container, wrap);
    }
}
