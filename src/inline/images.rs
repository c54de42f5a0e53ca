//! `<img>` source inlining.
//!
//! Every `<img>` in the clone is rewritten to carry a `data:` URL. Sources
//! already in `data:` form only get their recorded dimensions backfilled.
//! Network sources resolve against the document base URL and fetch in
//! batches through the runtime image cache, so repeated captures of the
//! same page hit the network once per distinct URL. A source that cannot
//! be fetched tries the configured fallback URL, then degrades the element
//! into a labeled placeholder box or an invisible spacer.

use crate::capture::CaptureSession;
use crate::dom::arena::qual_name;
use crate::dom::node::{ElementData, StyleMap};
use crate::dom::{Document, NodeId};
use crate::fetch::{FetchOptions, data_url};
use crate::runtime::CaptureRuntime;
use crate::style::format_px;
use crate::util::{extract_image_dimensions, resolve_url};

use super::BATCH_SIZE;

/// Rewrite every `<img>` under `root` to a self-contained source.
pub(crate) async fn inline_images(
    clone: &mut Document,
    root: NodeId,
    session: &mut CaptureSession<'_>,
) {
    let runtime = session.runtime;
    let opts = session.options;
    let base = clone.base_url.clone();

    let imgs: Vec<NodeId> = clone
        .descendants(root)
        .filter(|&id| clone.element(id).is_some_and(|el| el.tag() == "img"))
        .collect();

    let mut pending: Vec<(NodeId, String)> = Vec::new();
    for id in imgs {
        let src = clone
            .element(id)
            .and_then(|el| el.attr("src"))
            .map(str::to_string)
            .unwrap_or_default();
        if src.is_empty() {
            degrade_image(clone, id, session);
        } else if src.starts_with("data:") {
            fill_missing_dimensions(clone, id, &src);
        } else {
            pending.push((id, resolve_url(base.as_deref(), &src)));
        }
    }

    let proxy = opts.use_proxy.as_str();
    for batch in pending.chunks(BATCH_SIZE) {
        let fetched = futures::future::join_all(batch.iter().map(|(id, url)| async move {
            (*id, fetch_image(runtime, proxy, url).await)
        }))
        .await;

        for (id, outcome) in fetched {
            if let Some(inlined) = outcome {
                apply_source(clone, id, &inlined);
                continue;
            }
            if let Some(fallback) = &opts.fallback_url {
                let (w, h) = recorded_dimensions(clone, id);
                let url = resolve_url(
                    base.as_deref(),
                    &fallback.resolve(w.round().max(0.0) as u32, h.round().max(0.0) as u32),
                );
                if let Some(inlined) = fetch_image(runtime, proxy, &url).await {
                    apply_source(clone, id, &inlined);
                    continue;
                }
            }
            degrade_image(clone, id, session);
        }
    }
}

/// Resolve one image URL to a `data:` URL, consulting the runtime cache
/// first. A successful fetch is stored back so later captures reuse it.
pub(crate) async fn fetch_image(runtime: &CaptureRuntime, proxy: &str, url: &str) -> Option<String> {
    if let Some(hit) = runtime.cached_image(url) {
        return Some(hit);
    }
    let mut options = FetchOptions::data_url();
    if !proxy.is_empty() {
        options = options.with_proxy(proxy);
    }
    let record = runtime.fetch(url, &options).await;
    let inlined = record.as_data_url()?.to_string();
    runtime.store_image(url, &inlined);
    Some(inlined)
}

fn apply_source(clone: &mut Document, id: NodeId, inlined: &str) {
    clone.set_attr(id, "src", inlined);
    fill_missing_dimensions(clone, id, inlined);
}

/// Backfill `data-snapdomwidth`/`data-snapdomheight` from the decoded pixel
/// data when the cloner could not read them from the live element.
fn fill_missing_dimensions(clone: &mut Document, id: NodeId, inlined: &str) {
    let missing = clone.element(id).is_some_and(|el| {
        dimension_attr(el, "data-snapdomwidth").is_none()
            || dimension_attr(el, "data-snapdomheight").is_none()
    });
    if !missing {
        return;
    }
    let Ok((bytes, _)) = data_url::decode(inlined) else {
        return;
    };
    let Some((w, h)) = extract_image_dimensions(&bytes) else {
        return;
    };
    if clone
        .element(id)
        .is_some_and(|el| dimension_attr(el, "data-snapdomwidth").is_none())
    {
        clone.set_attr(id, "data-snapdomwidth", &w.to_string());
    }
    if clone
        .element(id)
        .is_some_and(|el| dimension_attr(el, "data-snapdomheight").is_none())
    {
        clone.set_attr(id, "data-snapdomheight", &h.to_string());
    }
}

fn dimension_attr(el: &ElementData, name: &str) -> Option<f64> {
    el.attr(name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| *v > 0.0)
}

/// Pixel footprint the degraded element should keep occupying.
fn recorded_dimensions(clone: &Document, id: NodeId) -> (f64, f64) {
    let Some(el) = clone.element(id) else {
        return (0.0, 0.0);
    };
    let w = dimension_attr(el, "data-snapdomwidth").unwrap_or(el.rect.width.max(0.0));
    let h = dimension_attr(el, "data-snapdomheight").unwrap_or(el.rect.height.max(0.0));
    (w, h)
}

/// Replace a failed image in place. With placeholders on it becomes a gray
/// labeled box; otherwise an invisible spacer holding the same footprint.
/// Either way the element turns synthetic, so its key is dropped and the
/// computed map serializes inline.
fn degrade_image(clone: &mut Document, id: NodeId, session: &mut CaptureSession<'_>) {
    let (w, h) = recorded_dimensions(clone, id);
    let style = if session.options.placeholders {
        placeholder_style(w, h)
    } else {
        spacer_style(w, h)
    };
    if let Some(el) = clone.element_mut(id) {
        el.name = qual_name("div");
        el.computed = style;
    }
    clone.remove_attr(id, "src");
    if session.options.placeholders {
        clone.append_text(id, "img");
    }
    session.style_map.remove(&id);
}

fn placeholder_style(width: f64, height: f64) -> StyleMap {
    let mut map = StyleMap::new();
    map.insert("display".to_string(), "inline-flex".to_string());
    map.insert("align-items".to_string(), "center".to_string());
    map.insert("justify-content".to_string(), "center".to_string());
    map.insert("width".to_string(), format_px(width.max(0.0)));
    map.insert("height".to_string(), format_px(height.max(0.0)));
    map.insert("background-color".to_string(), "#ccc".to_string());
    map.insert("color".to_string(), "#666".to_string());
    map.insert("font-size".to_string(), "12px".to_string());
    map.insert("overflow".to_string(), "hidden".to_string());
    map
}

fn spacer_style(width: f64, height: f64) -> StyleMap {
    let mut map = StyleMap::new();
    map.insert("display".to_string(), "inline-block".to_string());
    map.insert("width".to_string(), format_px(width.max(0.0)));
    map.insert("height".to_string(), format_px(height.max(0.0)));
    map.insert("visibility".to_string(), "hidden".to_string());
    map
}
