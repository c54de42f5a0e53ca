//! `background-image` layer inlining.
//!
//! Computed `background-image` values survive compression as inline style,
//! so the URLs they reference must be self-contained by then. This pass
//! collects every distinct remote `url(...)` under the capture root, fetches
//! them through the runtime background cache, and rewrites each value layer
//! by layer. Gradients and `data:` layers pass through untouched; a layer
//! whose fetch failed is dropped, and a value left with nothing visible
//! collapses to `none`.

use std::collections::{HashMap, HashSet};

use crate::capture::CaptureSession;
use crate::css::background::{find_urls, format_url, is_gradient, replace_urls, split_layers};
use crate::dom::{Document, NodeId};
use crate::fetch::FetchOptions;
use crate::runtime::CaptureRuntime;
use crate::util::resolve_url;

use super::BATCH_SIZE;

pub(crate) async fn inline_backgrounds(
    clone: &mut Document,
    root: NodeId,
    session: &CaptureSession<'_>,
) {
    let runtime = session.runtime;
    let proxy = session.options.use_proxy.as_str();
    let base = clone.base_url.clone();

    let mut targets: Vec<NodeId> = Vec::new();
    let mut wanted: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for id in clone.descendants(root).collect::<Vec<_>>() {
        let Some(value) = clone
            .element(id)
            .and_then(|el| el.computed.get("background-image"))
        else {
            continue;
        };
        let urls = remote_urls(value, base.as_deref());
        if urls.is_empty() {
            continue;
        }
        targets.push(id);
        for url in urls {
            if seen.insert(url.clone()) {
                wanted.push(url);
            }
        }
    }

    let mut resolved: HashMap<String, String> = HashMap::new();
    for batch in wanted.chunks(BATCH_SIZE) {
        let fetched = futures::future::join_all(batch.iter().map(|url| async move {
            (url.clone(), fetch_background(runtime, proxy, url).await)
        }))
        .await;
        for (url, outcome) in fetched {
            if let Some(inlined) = outcome {
                resolved.insert(url, inlined);
            }
        }
    }

    for id in targets {
        let Some(value) = clone
            .element(id)
            .and_then(|el| el.computed.get("background-image"))
            .cloned()
        else {
            continue;
        };
        let rewritten = rewrite_value(&value, base.as_deref(), &resolved);
        if let Some(el) = clone.element_mut(id) {
            el.computed
                .insert("background-image".to_string(), rewritten);
        }
    }
}

/// Network URLs a value references, resolved against the document base.
pub(crate) fn remote_urls(value: &str, base: Option<&str>) -> Vec<String> {
    find_urls(value)
        .into_iter()
        .filter(|span| !span.url.starts_with("data:"))
        .map(|span| resolve_url(base, &span.url))
        .collect()
}

pub(crate) async fn fetch_background(
    runtime: &CaptureRuntime,
    proxy: &str,
    url: &str,
) -> Option<String> {
    if let Some(hit) = runtime.cached_background(url) {
        return Some(hit);
    }
    let mut options = FetchOptions::data_url();
    if !proxy.is_empty() {
        options = options.with_proxy(proxy);
    }
    let record = runtime.fetch(url, &options).await;
    let inlined = record.as_data_url()?.to_string();
    runtime.store_background(url, &inlined);
    Some(inlined)
}

/// Rebuild a `background-image` value from its layers. A layer referencing
/// an unresolved URL is dropped rather than left pointing at the network.
fn rewrite_value(value: &str, base: Option<&str>, resolved: &HashMap<String, String>) -> String {
    let mut kept: Vec<String> = Vec::new();
    for layer in split_layers(value) {
        if is_gradient(layer) || layer.eq_ignore_ascii_case("none") {
            kept.push(layer.to_string());
            continue;
        }
        let mut missing = false;
        let replaced = replace_urls(layer, |url| {
            if url.starts_with("data:") {
                return None;
            }
            match resolved.get(&resolve_url(base, url)) {
                Some(inlined) => Some(format_url(inlined)),
                None => {
                    missing = true;
                    None
                }
            }
        });
        if !missing {
            kept.push(replaced);
        }
    }
    if kept.is_empty() || kept.iter().all(|layer| layer.eq_ignore_ascii_case("none")) {
        "none".to_string()
    } else {
        kept.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fetch::StaticFetcher;
    use crate::options::CaptureOptions;
    use crate::util::encode_rgba_png;

    fn bg_doc(value: &str) -> (Document, NodeId) {
        let mut clone = Document::new();
        let div = clone.create_el("div");
        if let Some(el) = clone.element_mut(div) {
            el.computed
                .insert("background-image".to_string(), value.to_string());
        }
        let doc_root = clone.document();
        clone.append(doc_root, div);
        clone.base_url = Some("https://page.test/".to_string());
        (clone, div)
    }

    fn bg_of(clone: &Document, id: NodeId) -> String {
        clone
            .element(id)
            .and_then(|el| el.computed.get("background-image"))
            .cloned()
            .unwrap_or_default()
    }

    fn png_fetcher(url: &str) -> Arc<StaticFetcher> {
        let bytes = encode_rgba_png(1, 1, vec![0, 0, 0, 255]).unwrap();
        Arc::new(StaticFetcher::new().with(url, bytes, Some("image/png")))
    }

    #[tokio::test]
    async fn test_remote_layer_inlined() {
        let runtime = CaptureRuntime::new(png_fetcher("https://page.test/bg.png"));
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("url(bg.png)");

        inline_backgrounds(&mut clone, div, &session).await;

        let value = bg_of(&clone, div);
        assert!(value.starts_with("url(\"data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_gradient_layer_survives_alongside_url() {
        let runtime = CaptureRuntime::new(png_fetcher("https://page.test/bg.png"));
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("linear-gradient(red, blue), url(bg.png)");

        inline_backgrounds(&mut clone, div, &session).await;

        let value = bg_of(&clone, div);
        assert!(value.starts_with("linear-gradient(red, blue), url(\"data:"));
    }

    #[tokio::test]
    async fn test_failed_layer_dropped() {
        let runtime = CaptureRuntime::new(Arc::new(StaticFetcher::new()));
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("url(missing.png), linear-gradient(red, blue)");

        inline_backgrounds(&mut clone, div, &session).await;

        assert_eq!(bg_of(&clone, div), "linear-gradient(red, blue)");
    }

    #[tokio::test]
    async fn test_all_layers_failed_collapses_to_none() {
        let runtime = CaptureRuntime::new(Arc::new(StaticFetcher::new()));
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("url(a.png), url(b.png)");

        inline_backgrounds(&mut clone, div, &session).await;

        assert_eq!(bg_of(&clone, div), "none");
    }

    #[tokio::test]
    async fn test_data_url_layer_untouched() {
        let fetcher = Arc::new(StaticFetcher::new());
        let runtime = CaptureRuntime::new(fetcher.clone());
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("url(data:image/gif;base64,R0lGOD)");

        inline_backgrounds(&mut clone, div, &session).await;

        assert_eq!(bg_of(&clone, div), "url(data:image/gif;base64,R0lGOD)");
        assert_eq!(fetcher.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_url_fetched_once() {
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://page.test/bg.png",
            encode_rgba_png(1, 1, vec![255, 255, 255, 255]).unwrap(),
            Some("image/png"),
        ));
        let runtime = CaptureRuntime::new(fetcher.clone());
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);

        let mut clone = Document::new();
        let parent = clone.create_el("div");
        let child = clone.create_el("div");
        for id in [parent, child] {
            if let Some(el) = clone.element_mut(id) {
                el.computed
                    .insert("background-image".to_string(), "url(bg.png)".to_string());
            }
        }
        let doc_root = clone.document();
        clone.append(doc_root, parent);
        clone.append(parent, child);
        clone.base_url = Some("https://page.test/".to_string());

        inline_backgrounds(&mut clone, parent, &session).await;

        assert_eq!(fetcher.hit_count(), 1);
        assert_eq!(bg_of(&clone, parent), bg_of(&clone, child));
        assert!(bg_of(&clone, child).starts_with("url(\"data:"));
    }

    #[tokio::test]
    async fn test_cached_background_skips_network() {
        let fetcher = Arc::new(StaticFetcher::new());
        let runtime = CaptureRuntime::new(fetcher.clone());
        runtime.store_background("https://page.test/bg.png", "data:image/png;base64,AA==");
        let options = CaptureOptions::new();
        let session = CaptureSession::new(&runtime, &options);
        let (mut clone, div) = bg_doc("url(bg.png)");

        inline_backgrounds(&mut clone, div, &session).await;

        assert_eq!(bg_of(&clone, div), "url(\"data:image/png;base64,AA==\")");
        assert_eq!(fetcher.hit_count(), 0);
    }
}
