//! Inline-style compression.
//!
//! After cloning, every element carries its full computed style. This pass
//! interns each element's style key into the class pool, replaces the
//! element's class attribute with the generated class, and strips the inline
//! map down to `background-image` (kept inline so the background inliner's
//! data URLs survive untouched). Two kinds of element opt out: shadow-scoped
//! clones keep inline styles reduced to their non-default subset, with the
//! scoped stylesheet carrying the author rules, and synthesized elements
//! with no recorded key serialize their whole computed map inline.

use std::collections::{HashMap, HashSet};

use crate::dom::{Document, NodeId};
use crate::style::ClassPool;
use crate::style::snapshot::baseline_diff;

/// Fold recorded style keys into classes and strip inline styles.
/// Returns the class rule CSS.
pub(crate) fn compress_styles(
    clone: &mut Document,
    root: NodeId,
    style_map: &HashMap<NodeId, String>,
    shadow_scoped: &HashSet<NodeId>,
) -> String {
    let mut pool = ClassPool::new();

    let ids: Vec<NodeId> = clone
        .descendants(root)
        .filter(|&id| clone.is_element(id))
        .collect();

    for id in ids {
        if shadow_scoped.contains(&id) {
            if let Some(el) = clone.element(id) {
                let reduced = baseline_diff(el.tag(), &el.computed);
                if let Some(el) = clone.element_mut(id) {
                    el.computed = reduced;
                }
            }
            continue;
        }
        let Some(key) = style_map.get(&id) else {
            continue;
        };

        let class = pool.class_for(key);
        clone.set_attr(id, "class", &class);
        if let Some(el) = clone.element_mut(id) {
            el.computed.retain(|prop, _| prop == "background-image");
        }
    }

    pool.to_css()
}
