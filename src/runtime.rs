//! Process-wide capture state.
//!
//! A [`CaptureRuntime`] owns every cache that outlives a single capture:
//! the fetch layer, inlined image and background data URLs, emitted font
//! CSS, and the style-snapshot signature table. Sessions borrow it; the
//! [`CachePolicy`] chosen per capture decides what survives between runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::dom::{Document, NodeId};
use crate::dom::node::StyleMap;
use crate::fetch::{FetchManager, FetchOptions, ResourceFetcher, ResourceRecord};
use crate::options::CachePolicy;
use crate::style::StyleCache;
use crate::util::lock_unpoisoned;

/// Shared caches behind the capture API. One per [`crate::SnapDom`] handle.
pub struct CaptureRuntime {
    fetch: FetchManager,
    /// Image source URL → inlined data URL.
    image_cache: Mutex<HashMap<String, String>>,
    /// Background layer URL → inlined data URL.
    background_cache: Mutex<HashMap<String, String>>,
    /// Font embedder input signature → emitted CSS.
    font_css_cache: Mutex<HashMap<String, String>>,
    /// Font src URL → inlined data URL.
    font_url_cache: Mutex<HashMap<String, String>>,
    /// `@import` URLs already primed by the font embedder.
    import_markers: Mutex<HashSet<String>>,
    /// Snapshot memo: per-node keys plus the signature table.
    style_cache: Mutex<StyleCache>,
}

impl CaptureRuntime {
    pub fn new(transport: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetch: FetchManager::new(transport),
            image_cache: Mutex::new(HashMap::new()),
            background_cache: Mutex::new(HashMap::new()),
            font_css_cache: Mutex::new(HashMap::new()),
            font_url_cache: Mutex::new(HashMap::new()),
            import_markers: Mutex::new(HashSet::new()),
            style_cache: Mutex::new(StyleCache::new()),
        }
    }

    /// Apply a cache policy at session start.
    pub fn apply_policy(&self, policy: CachePolicy) {
        match policy {
            CachePolicy::Disabled => {
                self.fetch.clear_resources();
                lock_unpoisoned(&self.image_cache).clear();
                lock_unpoisoned(&self.background_cache).clear();
                lock_unpoisoned(&self.font_css_cache).clear();
                lock_unpoisoned(&self.font_url_cache).clear();
                lock_unpoisoned(&self.import_markers).clear();
                lock_unpoisoned(&self.style_cache).clear();
                self.fetch.reset_session();
            }
            CachePolicy::Soft => {
                lock_unpoisoned(&self.image_cache).clear();
                lock_unpoisoned(&self.background_cache).clear();
                self.fetch.reset_session();
            }
            CachePolicy::Auto => {
                self.fetch.reset_session();
            }
            CachePolicy::Full => {}
        }
    }

    pub fn fetch_manager(&self) -> &FetchManager {
        &self.fetch
    }

    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> ResourceRecord {
        self.fetch.fetch(url, options).await
    }

    // ------------------------------------------------------------------
    // Inline caches
    // ------------------------------------------------------------------

    pub fn cached_image(&self, url: &str) -> Option<String> {
        lock_unpoisoned(&self.image_cache).get(url).cloned()
    }

    pub fn store_image(&self, url: &str, data_url: &str) {
        lock_unpoisoned(&self.image_cache).insert(url.to_string(), data_url.to_string());
    }

    pub fn cached_background(&self, url: &str) -> Option<String> {
        lock_unpoisoned(&self.background_cache).get(url).cloned()
    }

    pub fn store_background(&self, url: &str, data_url: &str) {
        lock_unpoisoned(&self.background_cache).insert(url.to_string(), data_url.to_string());
    }

    // ------------------------------------------------------------------
    // Font caches
    // ------------------------------------------------------------------

    pub fn cached_font_css(&self, signature: &str) -> Option<String> {
        lock_unpoisoned(&self.font_css_cache).get(signature).cloned()
    }

    pub fn store_font_css(&self, signature: &str, css: &str) {
        lock_unpoisoned(&self.font_css_cache).insert(signature.to_string(), css.to_string());
    }

    pub fn cached_font_url(&self, url: &str) -> Option<String> {
        lock_unpoisoned(&self.font_url_cache).get(url).cloned()
    }

    pub fn store_font_url(&self, url: &str, data_url: &str) {
        lock_unpoisoned(&self.font_url_cache).insert(url.to_string(), data_url.to_string());
    }

    /// Mark an `@import` URL as primed; true the first time only.
    pub fn mark_import(&self, url: &str) -> bool {
        lock_unpoisoned(&self.import_markers).insert(url.to_string())
    }

    // ------------------------------------------------------------------
    // Style snapshots
    // ------------------------------------------------------------------

    pub fn style_key(&self, doc: &Document, id: NodeId) -> String {
        lock_unpoisoned(&self.style_cache).style_key(doc, id)
    }

    pub fn style_key_for_map(&self, tag: &str, map: &StyleMap) -> String {
        lock_unpoisoned(&self.style_cache).key_for_map(tag, map)
    }

    #[cfg(test)]
    pub(crate) fn signature_count(&self) -> usize {
        lock_unpoisoned(&self.style_cache).signature_count()
    }
}

impl Default for CaptureRuntime {
    fn default() -> Self {
        Self {
            fetch: FetchManager::default(),
            image_cache: Mutex::new(HashMap::new()),
            background_cache: Mutex::new(HashMap::new()),
            font_css_cache: Mutex::new(HashMap::new()),
            font_url_cache: Mutex::new(HashMap::new()),
            import_markers: Mutex::new(HashSet::new()),
            style_cache: Mutex::new(StyleCache::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    fn runtime() -> CaptureRuntime {
        CaptureRuntime::new(Arc::new(StaticFetcher::new()))
    }

    #[test]
    fn test_soft_policy_clears_inline_caches_only() {
        let rt = runtime();
        rt.store_image("https://x.test/a.png", "data:image/png;base64,AA==");
        rt.store_background("https://x.test/b.png", "data:image/png;base64,BB==");
        rt.store_font_url("https://x.test/f.woff2", "data:font/woff2;base64,CC==");

        rt.apply_policy(CachePolicy::Soft);
        assert!(rt.cached_image("https://x.test/a.png").is_none());
        assert!(rt.cached_background("https://x.test/b.png").is_none());
        assert!(rt.cached_font_url("https://x.test/f.woff2").is_some());
    }

    #[test]
    fn test_disabled_policy_clears_everything() {
        let rt = runtime();
        rt.store_font_css("sig", "@font-face{}");
        rt.store_font_url("https://x.test/f.woff2", "data:font/woff2;base64,CC==");
        assert!(rt.mark_import("https://x.test/i.css"));

        rt.apply_policy(CachePolicy::Disabled);
        assert!(rt.cached_font_css("sig").is_none());
        assert!(rt.cached_font_url("https://x.test/f.woff2").is_none());
        // Import marker was forgotten, so priming happens again
        assert!(rt.mark_import("https://x.test/i.css"));
    }

    #[test]
    fn test_full_policy_keeps_inline_caches() {
        let rt = runtime();
        rt.store_image("https://x.test/a.png", "data:image/png;base64,AA==");
        rt.apply_policy(CachePolicy::Full);
        assert!(rt.cached_image("https://x.test/a.png").is_some());
    }

    #[test]
    fn test_import_marker_primes_once() {
        let rt = runtime();
        assert!(rt.mark_import("https://x.test/fonts.css"));
        assert!(!rt.mark_import("https://x.test/fonts.css"));
    }
}
