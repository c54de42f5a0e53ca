//! Resource inlining passes over the cloned tree.
//!
//! After cloning, `<img>` sources and `background-image` layers still point
//! at their original URLs. These passes fetch each resource once through the
//! runtime caches and rewrite the references to `data:` URLs so the final
//! markup is self-contained. Fetches run in small concurrent batches and a
//! failed resource degrades the element in place rather than failing the
//! capture.

use std::collections::HashSet;

use crate::dom::{Document, NodeId};
use crate::runtime::CaptureRuntime;
use crate::util::resolve_url;

pub(crate) mod background;
pub(crate) mod images;

pub(crate) use background::inline_backgrounds;
pub(crate) use images::inline_images;

/// Concurrent fetches per batch.
const BATCH_SIZE: usize = 4;

/// Prefetch every `<img>` source and `background-image` URL under `root`,
/// shadow trees included, into the runtime caches. Failures are memoized
/// by the fetch layer and retried only after the failure TTL expires.
pub(crate) async fn warm_resources(
    runtime: &CaptureRuntime,
    doc: &Document,
    root: NodeId,
    proxy: &str,
) {
    let base = doc.base_url.as_deref();
    let mut images: Vec<String> = Vec::new();
    let mut backgrounds: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(el) = doc.element(id) {
            if el.tag() == "img"
                && let Some(src) = el.attr("src")
                && !src.is_empty()
                && !src.starts_with("data:")
            {
                let url = resolve_url(base, src);
                if seen.insert(url.clone()) {
                    images.push(url);
                }
            }
            if let Some(value) = el.computed.get("background-image") {
                for url in background::remote_urls(value, base) {
                    if seen.insert(url.clone()) {
                        backgrounds.push(url);
                    }
                }
            }
            if let Some(shadow) = el.shadow_root {
                stack.push(shadow);
            }
        }
        stack.extend(doc.children(id));
    }

    for batch in images.chunks(BATCH_SIZE) {
        futures::future::join_all(
            batch
                .iter()
                .map(|url| images::fetch_image(runtime, proxy, url)),
        )
        .await;
    }
    for batch in backgrounds.chunks(BATCH_SIZE) {
        futures::future::join_all(
            batch
                .iter()
                .map(|url| background::fetch_background(runtime, proxy, url)),
        )
        .await;
    }
}
