//! WASM bindings for in-browser capture.
//!
//! Exposes a single `capture` entry: HTML markup (plus optional extra CSS
//! and JSON options) in, SVG data URL out. Raster exports stay native. The
//! wasm fetch layer resolves `data:` URLs only, so remote resources must be
//! inlined before calling in.

use wasm_bindgen::prelude::*;

use crate::dom::{Document, NodeId, parse_html_with_css};
use crate::options::CaptureOptions;

/// Initialize panic hook for readable errors in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Capture the given markup and return the SVG data URL.
///
/// The capture root is the body's first element child (the root element for
/// body-less fragments). `options_json` takes the camelCase schema of
/// [`CaptureOptions`]; an empty string means defaults. Fast mode is always
/// on: the wasm entry never yields between phases.
#[wasm_bindgen]
pub fn capture(html: &str, css: &str, options_json: &str) -> Result<String, JsValue> {
    let mut options: CaptureOptions = if options_json.trim().is_empty() {
        CaptureOptions::new()
    } else {
        serde_json::from_str(options_json)
            .map_err(|e| JsValue::from_str(&format!("invalid options: {e}")))?
    };
    options.fast = true;

    let doc = parse_html_with_css(html, css);
    let target = capture_root(&doc).ok_or_else(|| JsValue::from_str("document has no element"))?;

    let snapshot = futures::executor::block_on(crate::snapdom(&doc, target, &options))
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(snapshot.url().to_string())
}

/// The body's first element child, or the root element of a body-less tree.
fn capture_root(doc: &Document) -> Option<NodeId> {
    let root = doc.root_element()?;
    let body = doc
        .children(root)
        .find(|&id| doc.element(id).is_some_and(|el| el.tag() == "body"));
    if let Some(body) = body
        && let Some(child) = doc.children(body).find(|&id| doc.is_element(id))
    {
        return Some(child);
    }
    Some(root)
}
