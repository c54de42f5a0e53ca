//! Capture orchestration.
//!
//! A capture runs as a strict phase sequence over a detached clone of the
//! target subtree: clone (with scroll-state flattening), iframe
//! rasterization, image inlining, background inlining, font embedding,
//! style compression, then frame computation and SVG assembly. Phases yield
//! through [`idle`] so a slow capture stays cooperative. Resource failures
//! degrade the artifact in place; only an invalid target or a structural
//! clone failure aborts the capture.

pub(crate) mod clone;
pub(crate) mod post;
pub(crate) mod pseudo;
pub(crate) mod shadow;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use selectors::parser::SelectorList;

use crate::dom::{Document, NodeId, SnapSelectors, parse_selector_list};
use crate::error::{Error, Result};
use crate::export::Snapshot;
use crate::fetch::origin_of;
use crate::fonts::{self, FontEmbedConfig};
use crate::geometry::{composed_transform, compute_frame, matching_close};
use crate::inline::{inline_backgrounds, inline_images};
use crate::options::{CachePolicy, CaptureOptions};
use crate::runtime::CaptureRuntime;
use crate::style::compress_styles;
use crate::svg::{build_svg, to_data_url};
use crate::util::idle;

// ============================================================================
// Session
// ============================================================================

/// A queued same-origin iframe rasterization. The inner document is
/// captured and painted after cloning finishes; its PNG becomes the source
/// of the stub `<img>` the cloner left behind.
pub(crate) struct IframeJob {
    /// Clone-side `<img>` that receives the rasterized document.
    pub(crate) img: NodeId,
    pub(crate) doc: Arc<Document>,
    /// Content-box size the inner capture is pinned to.
    pub(crate) width: f64,
    pub(crate) height: f64,
}

/// Transient per-capture state. Sessions borrow the process-wide runtime;
/// everything else dies with the capture.
pub(crate) struct CaptureSession<'a> {
    pub(crate) runtime: &'a CaptureRuntime,
    pub(crate) options: &'a CaptureOptions,
    /// Compiled `exclude` selectors; invalid ones were dropped with a warning.
    pub(crate) exclude_lists: Vec<SelectorList<SnapSelectors>>,
    /// Clone node → source node.
    pub(crate) node_map: HashMap<NodeId, NodeId>,
    /// Clone elements styled by a shadow scope sheet instead of the class pool.
    pub(crate) shadow_scoped: HashSet<NodeId>,
    /// Clone node → style key, the compressor's input.
    pub(crate) style_map: HashMap<NodeId, String>,
    pub(crate) iframe_jobs: Vec<IframeJob>,
    /// Source nodes dropped by remove-mode exclusion.
    pub(crate) pruned: HashSet<NodeId>,
    scope_counter: u32,
}

impl<'a> CaptureSession<'a> {
    pub(crate) fn new(runtime: &'a CaptureRuntime, options: &'a CaptureOptions) -> Self {
        let mut exclude_lists = Vec::new();
        for selector in &options.exclude {
            match parse_selector_list(selector) {
                Ok(list) => exclude_lists.push(list),
                Err(_) => log::warn!("ignoring invalid exclude selector {selector:?}"),
            }
        }
        Self {
            runtime,
            options,
            exclude_lists,
            node_map: HashMap::new(),
            shadow_scoped: HashSet::new(),
            style_map: HashMap::new(),
            iframe_jobs: Vec::new(),
            pruned: HashSet::new(),
            scope_counter: 0,
        }
    }

    /// Key a clone element whose computed map was edited after cloning.
    /// Shadow-scoped elements stay out of the class pool.
    pub(crate) fn record_style_from(&mut self, clone: &Document, id: NodeId) {
        if self.shadow_scoped.contains(&id) {
            return;
        }
        let Some(el) = clone.element(id) else { return };
        let key = self.runtime.style_key_for_map(el.tag(), &el.computed);
        self.style_map.insert(id, key);
    }

    /// Next shadow scope id, `s1, s2, …` within the capture.
    pub(crate) fn next_scope_id(&mut self) -> String {
        self.scope_counter += 1;
        format!("s{}", self.scope_counter)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Capture `target` from `src` into a [`Snapshot`].
pub(crate) async fn capture_node(
    runtime: &CaptureRuntime,
    src: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<Snapshot> {
    validate_target(src, target)?;

    runtime.apply_policy(options.cache);
    if let Some(base) = src.base_url.as_deref() {
        runtime.fetch_manager().set_page_origin(Some(origin_of(base)));
    }

    let mut clone = Document::new();
    clone.base_url = src.base_url.clone();
    clone.viewport = src.viewport;
    clone.ua_profile = src.ua_profile;

    let mut session = CaptureSession::new(runtime, options);
    let root = clone::clone_subtree(src, target, &mut clone, &mut session)?;
    normalize_root(src, target, &mut clone, root, &mut session);
    post::apply_scroll_state(&mut clone, root, &mut session);
    idle(options.fast).await;

    // Stub images need their sources before the image pass judges them.
    resolve_iframe_jobs(runtime, &mut clone, &mut session).await;
    idle(options.fast).await;

    inline_images(&mut clone, root, &mut session).await;
    idle(options.fast).await;

    inline_backgrounds(&mut clone, root, &session).await;
    idle(options.fast).await;

    let scan = fonts::scan_subtree(src, target);
    let fonts_css =
        fonts::embed_fonts(runtime, src, &scan, &FontEmbedConfig::from_capture(options)).await;
    idle(options.fast).await;

    let class_css = compress_styles(&mut clone, root, &session.style_map, &session.shadow_scoped);

    let frame = compute_frame(src, target, &session.pruned, options);
    let svg_text = build_svg(&clone, root, &frame, &fonts_css, &class_css);
    let url = to_data_url(&svg_text);

    Ok(Snapshot::new(
        url,
        svg_text,
        frame,
        clone,
        root,
        session.style_map,
        options.clone(),
    ))
}

/// The target must be an element attached to the given document.
fn validate_target(src: &Document, id: NodeId) -> Result<()> {
    if !src.is_element(id) {
        return Err(Error::InvalidInput(
            "capture target must be an element node".to_string(),
        ));
    }
    let mut current = id;
    while current != src.document() {
        let parent = src.get(current).map(|n| n.parent).unwrap_or(NodeId::NONE);
        if parent.is_none() {
            return Err(Error::InvalidInput(
                "capture target is detached from its document".to_string(),
            ));
        }
        current = parent;
    }
    Ok(())
}

// ============================================================================
// Root Normalization
// ============================================================================

/// Adjust the clone root to match the frame options: with `outer_shadows`
/// off the overflowing paint is stripped (the viewBox reserves no bleed for
/// it); with `outer_transforms` off translate and rotation are dropped and
/// the surviving scale/skew is re-anchored at the box origin, mirroring the
/// decomposition the geometry engine applies.
fn normalize_root(
    src: &Document,
    target: NodeId,
    clone: &mut Document,
    root: NodeId,
    session: &mut CaptureSession<'_>,
) {
    let options = session.options;
    let mut changed = false;

    if !options.outer_shadows
        && let Some(el) = clone.element_mut(root)
    {
        for prop in [
            "box-shadow",
            "outline",
            "outline-width",
            "outline-style",
            "outline-color",
        ] {
            changed |= el.computed.remove(prop).is_some();
        }
        if let Some(filter) = el.computed.get("filter").cloned() {
            let kept = strip_overflow_filters(&filter);
            if kept != filter {
                if kept.is_empty() {
                    el.computed.remove("filter");
                } else {
                    el.computed.insert("filter".to_string(), kept);
                }
                changed = true;
            }
        }
    }

    if !options.outer_transforms
        && let Some(el) = src.element(target)
    {
        let matrix = composed_transform(&el.computed);
        if !matrix.is_identity()
            && let Some(el) = clone.element_mut(root)
        {
            let reduced = matrix.without_translate_rotate();
            for prop in ["translate", "rotate", "scale"] {
                el.computed.remove(prop);
            }
            if reduced.is_identity() {
                el.computed.remove("transform");
                el.computed.remove("transform-origin");
            } else {
                el.computed
                    .insert("transform".to_string(), reduced.to_css());
                el.computed
                    .insert("transform-origin".to_string(), "0 0".to_string());
            }
            changed = true;
        }
    }

    if changed {
        session.record_style_from(clone, root);
    }
}

/// Drop `blur(...)` and `drop-shadow(...)` from a filter list, keeping the
/// other functions in order. Returns an empty string when nothing survives.
fn strip_overflow_filters(value: &str) -> String {
    let mut kept = String::new();
    let mut rest = value;
    while let Some(open) = rest.find('(') {
        let name_start = rest[..open]
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        let name = rest[name_start..open].trim().to_ascii_lowercase();
        let Some(close) = matching_close(rest, open) else {
            break;
        };
        if !matches!(name.as_str(), "blur" | "drop-shadow") {
            if !kept.is_empty() {
                kept.push(' ');
            }
            kept.push_str(rest[name_start..=close].trim());
        }
        rest = &rest[close + 1..];
    }
    kept
}

// ============================================================================
// Iframe Resolution
// ============================================================================

/// Rasterize queued same-origin iframe documents into their stub images.
/// A failed inner capture leaves the stub sourceless; the image inliner
/// then degrades it like any broken image.
async fn resolve_iframe_jobs(
    runtime: &CaptureRuntime,
    clone: &mut Document,
    session: &mut CaptureSession<'_>,
) {
    let jobs = std::mem::take(&mut session.iframe_jobs);
    for job in jobs {
        let Some(target) = frame_capture_root(&job.doc) else {
            log::debug!("iframe document has no capturable root");
            continue;
        };
        let mut inner = session.options.clone();
        inner.width = Some(job.width.max(1.0));
        inner.height = Some(job.height.max(1.0));
        inner.scale = 1.0;
        inner.dpr = 1.0;
        // The outer capture already applied its cache policy.
        inner.cache = CachePolicy::Full;

        let captured = Box::pin(capture_node(runtime, &job.doc, target, &inner)).await;
        match captured.and_then(|snapshot| snapshot.to_png()) {
            Ok(png) => clone.set_attr(job.img, "src", &png.src),
            Err(err) => log::warn!("iframe rasterization failed: {err}"),
        }
    }
}

/// `<body>` when the inner document has one, else its root element.
fn frame_capture_root(doc: &Document) -> Option<NodeId> {
    let root = doc.root_element()?;
    if doc.element(root).is_some_and(|el| el.tag() == "body") {
        return Some(root);
    }
    doc.children(root)
        .find(|&id| doc.element(id).is_some_and(|el| el.tag() == "body"))
        .or(Some(root))
}
