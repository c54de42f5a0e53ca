//! Deep DOM cloning.
//!
//! Walks a source subtree and rebuilds it in a detached arena, freezing the
//! live state serialization would lose: responsive image choices, canvas
//! bitmaps, form values, shadow trees, and slot assignments. Styles travel as
//! computed maps on the clone; the compressor later folds them into shared
//! classes. Same-origin iframes are not rasterized here, they queue as jobs
//! the async pipeline resolves afterwards.

use std::sync::Arc;

use crate::css::values::parse_px;
use crate::dom::arena::attr_name;
use crate::dom::node::{Attribute, ElementData, StyleMap};
use crate::dom::{Document, NodeData, NodeId, matches_selector_list};
use crate::error::{Error, Result};
use crate::options::{ElementView, ExcludeMode};
use crate::style::{format_px, substitute_vars};
use crate::util::{encode_rgba_png, transparent_png_data_url};

use super::pseudo::synthesize_pseudo;
use super::shadow::{self, SCOPE_ATTR, SLOTTED_ATTR};
use super::{CaptureSession, IframeJob};

/// Tags that never enter a capture: non-rendering or already captured
/// through other channels (stylesheets travel as classes and font CSS).
const NO_CAPTURE_TAGS: &[&str] = &["script", "style", "link", "meta", "noscript", "template"];

#[derive(Clone, Copy)]
struct Ctx {
    is_root: bool,
    in_shadow: bool,
}

impl Ctx {
    fn descend(self) -> Self {
        Self {
            is_root: false,
            ..self
        }
    }
}

/// Clone `root` and everything under it into `clone`. The capture root is
/// exempt from exclusion rules.
pub(crate) fn clone_subtree(
    src: &Document,
    root: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
) -> Result<NodeId> {
    let ctx = Ctx {
        is_root: true,
        in_shadow: false,
    };
    clone_node(src, root, clone, session, ctx)
        .ok_or_else(|| Error::CloneFailure("capture root produced no output".to_string()))
}

fn clone_node(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    match &src.get(id)?.data {
        NodeData::Text(text) => {
            let text = text.clone();
            Some(clone.create_text(text))
        }
        NodeData::Element(_) => clone_element(src, id, clone, session, ctx),
        // Comments and doctypes never reach the output.
        _ => None,
    }
}

fn clone_element(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    let el = src.element(id)?;
    let tag = el.tag();

    if !ctx.is_root {
        if NO_CAPTURE_TAGS.contains(&tag) {
            return None;
        }
        match exclusion_of(src, id, session) {
            Some(ExcludeMode::Remove) => {
                session.pruned.insert(id);
                return None;
            }
            Some(ExcludeMode::Hide) => {
                return Some(make_spacer(clone, el.rect.width, el.rect.height));
            }
            None => {}
        }
    }

    match tag {
        "iframe" => clone_iframe(src, id, clone, session, ctx),
        "canvas" => clone_canvas(src, id, clone, session, ctx),
        "slot" if ctx.in_shadow => clone_slot(src, id, clone, session, ctx),
        _ => clone_regular(src, id, clone, session, ctx),
    }
}

/// How an element is excluded, if at all. Selector rules and the filter
/// predicate carry independent modes.
fn exclusion_of(src: &Document, id: NodeId, session: &CaptureSession<'_>) -> Option<ExcludeMode> {
    for list in &session.exclude_lists {
        if matches_selector_list(src, id, list) {
            return Some(session.options.exclude_mode);
        }
    }
    if let Some(filter) = &session.options.filter {
        let el = src.element(id)?;
        if !filter(&ElementView::new(el)) {
            return Some(session.options.filter_mode);
        }
    }
    None
}

// ============================================================================
// Regular Elements
// ============================================================================

fn clone_regular(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    let el = src.element(id)?;
    let tag = el.tag().to_string();

    let mut data = detach_payload(el);
    let mut restyled = resolve_var_references(&mut data.computed);
    match tag.as_str() {
        "img" => restyled |= freeze_img(&mut data, el),
        "input" => freeze_input(&mut data, el),
        _ => {}
    }

    let clone_id = clone.import_element(data);
    session.node_map.insert(clone_id, id);
    if ctx.in_shadow {
        session.shadow_scoped.insert(clone_id);
    } else if restyled {
        session.record_style_from(clone, clone_id);
    } else {
        let key = session.runtime.style_key(src, id);
        session.style_map.insert(clone_id, key);
    }

    if el.shadow_root.is_some() {
        clone_shadow_tree(src, id, clone, clone_id, session);
    } else if tag == "textarea" {
        lock_textarea(src, id, clone, clone_id, session, ctx);
    } else {
        for child in src.children(id) {
            if let Some(cloned) = clone_node(src, child, clone, session, ctx.descend()) {
                clone.append(clone_id, cloned);
            }
        }
    }

    if tag == "select" {
        freeze_select(src, clone, clone_id, session);
    }

    for (kind, map) in &el.pseudos {
        let resolved = resolve_pseudo_map(map, &el.computed);
        synthesize_pseudo(clone, clone_id, *kind, &resolved, session, ctx.in_shadow);
    }

    Some(clone_id)
}

/// Copy an element's payload minus the fields that reference the source
/// arena or are rebuilt on the clone side.
fn detach_payload(el: &ElementData) -> ElementData {
    let mut data = el.clone();
    data.shadow_root = None;
    data.assigned_nodes.clear();
    data.iframe = None;
    data.canvas = None;
    data.pseudos.clear();
    data.current_src = None;
    data
}

/// Substitute `var()` references against the element's own custom
/// properties. Returns whether anything changed.
fn resolve_var_references(map: &mut StyleMap) -> bool {
    let replacements: Vec<(String, String)> = map
        .iter()
        .filter(|(prop, value)| !prop.starts_with("--") && value.contains("var("))
        .filter_map(|(prop, value)| {
            substitute_vars(value, map, 8).map(|resolved| (prop.clone(), resolved))
        })
        .filter(|(prop, resolved)| map.get(prop).map(String::as_str) != Some(resolved.as_str()))
        .collect();
    let changed = !replacements.is_empty();
    for (prop, value) in replacements {
        map.insert(prop, value);
    }
    changed
}

/// Pseudo maps may reference custom properties living on their owner; build
/// the lookup over both before substituting.
fn resolve_pseudo_map(pseudo: &StyleMap, owner: &StyleMap) -> StyleMap {
    if !pseudo.values().any(|v| v.contains("var(")) {
        return pseudo.clone();
    }
    let mut lookup = owner.clone();
    for (prop, value) in pseudo {
        lookup.insert(prop.clone(), value.clone());
    }
    let mut out = pseudo.clone();
    resolve_var_references_with(&mut out, &lookup);
    out
}

fn resolve_var_references_with(map: &mut StyleMap, lookup: &StyleMap) {
    let replacements: Vec<(String, String)> = map
        .iter()
        .filter(|(prop, value)| !prop.starts_with("--") && value.contains("var("))
        .filter_map(|(prop, value)| {
            substitute_vars(value, lookup, 8).map(|resolved| (prop.clone(), resolved))
        })
        .collect();
    for (prop, value) in replacements {
        map.insert(prop, value);
    }
}

// ============================================================================
// Attribute Freezing
// ============================================================================

fn set_payload_attr(data: &mut ElementData, name: &str, value: &str) {
    match data
        .attrs
        .iter_mut()
        .find(|a| a.name.local.as_ref() == name)
    {
        Some(attr) => attr.value = value.to_string(),
        None => data.attrs.push(Attribute {
            name: attr_name(name),
            value: value.to_string(),
        }),
    }
}

fn remove_payload_attr(data: &mut ElementData, name: &str) {
    data.attrs.retain(|a| a.name.local.as_ref() != name);
}

fn attr_dimension(el: &ElementData, name: &str) -> Option<f64> {
    el.attr(name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| *v > 0.0)
}

/// Pin an `<img>` to the source it is actually showing. Responsive attributes
/// are dropped, the chosen source wins, and percentage or auto sizing is
/// frozen to the laid-out pixels.
fn freeze_img(data: &mut ElementData, source: &ElementData) -> bool {
    if let Some(url) = source
        .current_src
        .clone()
        .or_else(|| source.attr("src").map(str::to_string))
    {
        set_payload_attr(data, "src", &url);
    }
    remove_payload_attr(data, "srcset");
    remove_payload_attr(data, "sizes");

    let width = attr_dimension(source, "width").unwrap_or(source.rect.width);
    let height = attr_dimension(source, "height").unwrap_or(source.rect.height);
    if width > 0.0 {
        set_payload_attr(data, "data-snapdomwidth", &format_dim(width));
    }
    if height > 0.0 {
        set_payload_attr(data, "data-snapdomheight", &format_dim(height));
    }

    let mut restyled = false;
    for prop in ["width", "height"] {
        let fluid = data
            .computed
            .get(prop)
            .is_some_and(|v| v == "auto" || v.ends_with('%'));
        if fluid {
            let px = if prop == "width" {
                source.rect.width
            } else {
                source.rect.height
            };
            if px > 0.0 {
                data.computed.insert(prop.to_string(), format_px(px));
                restyled = true;
            }
        }
    }
    restyled
}

fn format_dim(value: f64) -> String {
    (value.round() as i64).to_string()
}

/// Mirror live input state into serializable attributes.
fn freeze_input(data: &mut ElementData, source: &ElementData) {
    if let Some(value) = &source.form.value {
        set_payload_attr(data, "value", value);
    }
    match source.form.checked {
        Some(true) => set_payload_attr(data, "checked", ""),
        Some(false) => remove_payload_attr(data, "checked"),
        None => {}
    }
    if source.form.indeterminate {
        set_payload_attr(data, "indeterminate", "");
    }
}

/// Textareas keep their laid-out box and show the live value as text.
fn lock_textarea(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    clone_id: NodeId,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) {
    let (rect, value) = match src.element(id) {
        Some(el) => {
            let value = el.form.value.clone().unwrap_or_else(|| {
                let mut text = String::new();
                src.collect_text(id, &mut text);
                text
            });
            (el.rect, value)
        }
        None => return,
    };

    if let Some(el) = clone.element_mut(clone_id) {
        el.computed
            .insert("width".to_string(), format_px(rect.width));
        el.computed
            .insert("height".to_string(), format_px(rect.height));
    }
    if !ctx.in_shadow {
        session.record_style_from(clone, clone_id);
    }
    if !value.is_empty() {
        clone.append_text(clone_id, &value);
    }
}

/// Project live selection onto `selected` attributes after the options have
/// been cloned.
fn freeze_select(
    src: &Document,
    clone: &mut Document,
    select_clone: NodeId,
    session: &CaptureSession<'_>,
) {
    let options: Vec<NodeId> = clone
        .descendants(select_clone)
        .filter(|&n| clone.element(n).is_some_and(|e| e.tag() == "option"))
        .collect();
    for option in options {
        let selected = session
            .node_map
            .get(&option)
            .and_then(|&source_id| src.element(source_id))
            .is_some_and(|e| e.form.selected);
        if selected {
            clone.set_attr(option, "selected", "");
        } else {
            clone.remove_attr(option, "selected");
        }
    }
}

// ============================================================================
// Replaced Content
// ============================================================================

/// Invisible block reserving the layout footprint of something not captured.
pub(crate) fn make_spacer(clone: &mut Document, width: f64, height: f64) -> NodeId {
    let div = clone.create_el("div");
    if let Some(el) = clone.element_mut(div) {
        el.computed
            .insert("display".to_string(), "inline-block".to_string());
        el.computed
            .insert("width".to_string(), format_px(width.max(0.0)));
        el.computed
            .insert("height".to_string(), format_px(height.max(0.0)));
        el.computed
            .insert("visibility".to_string(), "hidden".to_string());
    }
    div
}

/// Canvases freeze into `<img>` elements carrying a PNG of their bitmap.
/// Unpainted canvases read as transparent; tainted ones lose their pixels
/// and leave a spacer.
fn clone_canvas(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    let el = src.element(id)?;
    let canvas = el.canvas.clone().unwrap_or_default();
    if canvas.tainted {
        return Some(make_spacer(clone, el.rect.width, el.rect.height));
    }

    let width = if canvas.width > 0 {
        canvas.width
    } else {
        attr_dimension(el, "width").map(|v| v as u32).unwrap_or(300)
    };
    let height = if canvas.height > 0 {
        canvas.height
    } else {
        attr_dimension(el, "height").map(|v| v as u32).unwrap_or(150)
    };

    let data_url = match canvas.pixels {
        Some(pixels) => match encode_rgba_png(width, height, pixels.as_ref().clone()) {
            Ok(bytes) => crate::fetch::data_url::encode(&bytes, "image/png"),
            Err(_) => return Some(make_spacer(clone, el.rect.width, el.rect.height)),
        },
        None => match transparent_png_data_url(width.max(1), height.max(1)) {
            Ok(url) => url,
            Err(_) => return Some(make_spacer(clone, el.rect.width, el.rect.height)),
        },
    };

    let mut computed = el.computed.clone();
    resolve_var_references(&mut computed);
    if el.rect.width > 0.0 {
        computed.insert("width".to_string(), format_px(el.rect.width));
    }
    if el.rect.height > 0.0 {
        computed.insert("height".to_string(), format_px(el.rect.height));
    }

    let img = clone.create_el("img");
    clone.set_attr(img, "src", &data_url);
    clone.set_attr(img, "width", &width.to_string());
    clone.set_attr(img, "height", &height.to_string());
    if let Some(c) = clone.element_mut(img) {
        c.computed = computed;
        c.rect = el.rect;
    }
    session.node_map.insert(img, id);
    if ctx.in_shadow {
        session.shadow_scoped.insert(img);
    } else {
        session.record_style_from(clone, img);
    }
    Some(img)
}

/// Same-origin iframes keep their chrome (border, background) on a wrapper
/// div and queue a rasterization job whose PNG fills a content-box `<img>`.
/// Cross-origin frames fall back to a striped placeholder or a spacer.
fn clone_iframe(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    let el = src.element(id)?;

    let Some(inner) = &el.iframe else {
        if session.options.placeholders {
            let div = clone.create_el("div");
            if let Some(c) = clone.element_mut(div) {
                c.computed
                    .insert("display".to_string(), "inline-block".to_string());
                c.computed
                    .insert("width".to_string(), format_px(el.rect.width.max(0.0)));
                c.computed
                    .insert("height".to_string(), format_px(el.rect.height.max(0.0)));
                c.computed.insert(
                    "background-image".to_string(),
                    "repeating-linear-gradient(45deg, #ddd, #ddd 5px, #fff 5px, #fff 10px)"
                        .to_string(),
                );
            }
            return Some(div);
        }
        return Some(make_spacer(clone, el.rect.width, el.rect.height));
    };

    let mut computed = el.computed.clone();
    resolve_var_references(&mut computed);
    computed.insert("display".to_string(), "inline-block".to_string());
    computed.insert("width".to_string(), format_px(el.rect.width.max(0.0)));
    computed.insert("height".to_string(), format_px(el.rect.height.max(0.0)));
    computed.insert("overflow".to_string(), "hidden".to_string());

    let wrapper = clone.create_el("div");
    if let Some(c) = clone.element_mut(wrapper) {
        c.computed = computed;
        c.rect = el.rect;
    }
    session.node_map.insert(wrapper, id);
    if ctx.in_shadow {
        session.shadow_scoped.insert(wrapper);
    } else {
        session.record_style_from(clone, wrapper);
    }

    let (content_w, content_h) = content_box_of(el);
    let img = clone.create_el("img");
    if let Some(c) = clone.element_mut(img) {
        c.computed
            .insert("display".to_string(), "block".to_string());
        c.computed
            .insert("width".to_string(), format_px(content_w));
        c.computed
            .insert("height".to_string(), format_px(content_h));
    }
    clone.append(wrapper, img);

    session.iframe_jobs.push(IframeJob {
        img,
        doc: Arc::clone(inner),
        width: content_w,
        height: content_h,
    });
    Some(wrapper)
}

/// Border-box to content-box, from the computed border and padding widths.
fn content_box_of(el: &ElementData) -> (f64, f64) {
    let edge = |prop: &str| el.style(prop).and_then(parse_px).unwrap_or(0.0);
    let width = el.rect.width
        - edge("border-left-width")
        - edge("border-right-width")
        - edge("padding-left")
        - edge("padding-right");
    let height = el.rect.height
        - edge("border-top-width")
        - edge("border-bottom-width")
        - edge("padding-top")
        - edge("padding-bottom");
    (width.max(0.0), height.max(0.0))
}

// ============================================================================
// Shadow DOM
// ============================================================================

/// Flatten a host's shadow tree into its clone: the host gets a scope
/// attribute, shadow stylesheets are rewritten against that scope and
/// injected as a `<style>` child, and the shadow children replace the
/// light children.
fn clone_shadow_tree(
    src: &Document,
    host_id: NodeId,
    clone: &mut Document,
    host_clone: NodeId,
    session: &mut CaptureSession<'_>,
) {
    let Some(el) = src.element(host_id) else {
        return;
    };
    let Some(shadow) = el.shadow_root else { return };

    let scope = session.next_scope_id();
    clone.set_attr(host_clone, SCOPE_ATTR, &scope);

    let mut css = String::new();
    for child in src.children(shadow) {
        if src.element(child).is_some_and(|e| e.tag() == "style") {
            src.collect_text(child, &mut css);
            css.push('\n');
        }
    }

    if !css.trim().is_empty() {
        let mut scoped = shadow::rewrite_shadow_css(&css, &scope);
        let root_map = src
            .root_element()
            .and_then(|r| src.element(r))
            .map(|e| &e.computed);
        if let Some(seed) = shadow::seed_rule(&scoped, &scope, &el.computed, root_map) {
            scoped.push_str(&seed);
        }
        let style_el = clone.create_el("style");
        clone.set_attr(style_el, SCOPE_ATTR, &scope);
        clone.append_text(style_el, &scoped);
        clone.append(host_clone, style_el);
    }

    let shadow_ctx = Ctx {
        is_root: false,
        in_shadow: true,
    };
    for child in src.children(shadow) {
        if src.element(child).is_some_and(|e| e.tag() == "style") {
            continue;
        }
        if let Some(cloned) = clone_node(src, child, clone, session, shadow_ctx) {
            clone.append(host_clone, cloned);
        }
    }
}

/// Slots dissolve into their rendered content: the assigned light nodes, or
/// the slot's own children as fallback. Assigned content is marked so scoped
/// shadow rules skip it.
fn clone_slot(
    src: &Document,
    id: NodeId,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
    ctx: Ctx,
) -> Option<NodeId> {
    let el = src.element(id)?;
    let assigned = el.assigned_nodes.clone();
    let fallback = assigned.is_empty();
    let nodes: Vec<NodeId> = if fallback {
        src.children(id).collect()
    } else {
        assigned
    };

    let frag = clone.create_fragment();
    for node in nodes {
        let child_ctx = Ctx {
            is_root: false,
            in_shadow: fallback && ctx.in_shadow,
        };
        if let Some(cloned) = clone_node(src, node, clone, session, child_ctx) {
            if !fallback {
                mark_slotted(clone, cloned);
            }
            clone.append(frag, cloned);
        }
    }
    Some(frag)
}

fn mark_slotted(clone: &mut Document, root: NodeId) {
    let ids: Vec<NodeId> = clone
        .descendants(root)
        .filter(|&n| clone.is_element(n))
        .collect();
    for id in ids {
        clone.set_attr(id, SLOTTED_ATTR, "");
    }
}
