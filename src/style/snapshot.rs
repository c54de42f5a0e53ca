//! Element style snapshots.
//!
//! A snapshot reduces an element's computed style to a deterministic key:
//! default styling for the tag is subtracted, values are canonicalized, and
//! volatile properties are dropped. Identical keys later share one CSS class.

use std::collections::HashMap;

use sha1_smol::Sha1;

use crate::css::background::neutralize_remote_urls;
use crate::dom::arena::{Document, NodeId};
use crate::dom::node::StyleMap;
use crate::style::defaults;

/// Properties that never enter a snapshot key. Animation state is transient
/// and custom properties are resolved into their usage sites beforehand.
fn is_denylisted(property: &str) -> bool {
    property.starts_with("animation")
        || property.starts_with("transition")
        || property.starts_with("view-timeline")
        || property.starts_with("scroll-timeline")
        || property.starts_with("offset-")
        || property.starts_with("--")
}

/// Cache of per-element style keys.
///
/// Keys are invalidated in bulk whenever the document mutates (tracked by
/// its epoch). The signature table survives epochs: a style map that hashes
/// the same as one seen before maps straight to its key without re-diffing.
#[derive(Debug, Default)]
pub struct StyleCache {
    epoch: u64,
    keys: HashMap<NodeId, String>,
    signatures: HashMap<String, String>,
    baselines: HashMap<String, StyleMap>,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, including the persistent signature table.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.signatures.clear();
        self.baselines.clear();
    }

    /// Number of distinct signatures seen.
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// The style key for an element's current computed style.
    pub fn style_key(&mut self, doc: &Document, id: NodeId) -> String {
        if doc.epoch() != self.epoch {
            self.keys.clear();
            self.epoch = doc.epoch();
        }

        if let Some(key) = self.keys.get(&id) {
            return key.clone();
        }

        let Some(el) = doc.element(id) else {
            return String::new();
        };
        let tag = el.tag().to_string();

        let signature = signature_of(&tag, &el.computed);
        if let Some(key) = self.signatures.get(&signature) {
            let key = key.clone();
            self.keys.insert(id, key.clone());
            return key;
        }

        let baseline = self
            .baselines
            .entry(tag.clone())
            .or_insert_with(|| baseline_for_tag(&tag));
        let key = build_key(&el.computed, baseline);

        self.signatures.insert(signature, key.clone());
        self.keys.insert(id, key.clone());
        key
    }

    /// Key for a bare style map, as used by pseudo-element styles.
    pub fn key_for_map(&mut self, tag: &str, map: &StyleMap) -> String {
        let signature = signature_of(tag, map);
        if let Some(key) = self.signatures.get(&signature) {
            return key.clone();
        }
        let baseline = self
            .baselines
            .entry(tag.to_string())
            .or_insert_with(|| baseline_for_tag(tag));
        let key = build_key(map, baseline);
        self.signatures.insert(signature, key.clone());
        key
    }
}

/// Non-default subset of a computed map, values kept verbatim.
///
/// Shadow-scoped clones serialize this as their inline style instead of
/// joining the class pool; their scoped stylesheet carries the author rules.
pub(crate) fn baseline_diff(tag: &str, map: &StyleMap) -> StyleMap {
    let baseline = baseline_for_tag(tag);
    let mut kept = StyleMap::new();
    for (prop, value) in map {
        if is_denylisted(prop) {
            continue;
        }
        let default = baseline
            .get(prop)
            .map(String::as_str)
            .or_else(|| defaults::initial_value(prop));
        if default == Some(value.as_str()) {
            continue;
        }
        kept.insert(prop.clone(), value.clone());
    }
    kept
}

/// Hash a style map together with its tag.
fn signature_of(tag: &str, map: &StyleMap) -> String {
    let mut hasher = Sha1::new();
    hasher.update(tag.as_bytes());
    hasher.update(b"|");
    for (prop, value) in map {
        hasher.update(prop.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    hasher.digest().to_string()
}

/// The computed style of an unstyled element of this tag.
fn baseline_for_tag(tag: &str) -> StyleMap {
    defaults::baseline_style(tag)
}

/// Diff a computed map against the tag baseline and serialize it.
fn build_key(computed: &StyleMap, baseline: &StyleMap) -> String {
    let mut kept = StyleMap::new();

    for (prop, value) in computed {
        if is_denylisted(prop) {
            continue;
        }

        // visibility:hidden renders as opacity:0 so hidden subtrees keep
        // their layout footprint in the flattened output
        if prop == "visibility" && value == "hidden" {
            kept.insert("opacity".to_string(), "0".to_string());
            continue;
        }

        let value = if value.contains("url(") {
            neutralize_remote_urls(value)
        } else {
            value.clone()
        };

        let default = baseline
            .get(prop)
            .map(String::as_str)
            .or_else(|| defaults::initial_value(prop));
        if default == Some(value.as_str()) {
            continue;
        }

        kept.insert(prop.clone(), value);
    }

    let mut key = String::with_capacity(kept.len() * 24);
    for (prop, value) in &kept {
        key.push_str(prop);
        key.push_str(": ");
        key.push_str(value);
        key.push(';');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_html_with_css;

    #[test]
    fn test_unstyled_element_has_empty_key() {
        let doc = parse_html_with_css("<div>x</div>", "");
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(cache.style_key(&doc, id), "");
    }

    #[test]
    fn test_authored_style_appears_in_key() {
        let doc = parse_html_with_css("<div>x</div>", "div { color: red }");
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(cache.style_key(&doc, id), "color: red;");
    }

    #[test]
    fn test_default_restated_is_dropped() {
        let doc = parse_html_with_css("<div>x</div>", "div { display: block; margin-top: 0px }");
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(cache.style_key(&doc, id), "");
    }

    #[test]
    fn test_tag_defaults_subtracted() {
        let doc = parse_html_with_css("<h1>x</h1>", "h1 { font-weight: 700; color: teal }");
        let id = doc.find_by_tag("h1").unwrap();
        let mut cache = StyleCache::new();
        // font-weight: 700 is the h1 default; only color survives
        assert_eq!(cache.style_key(&doc, id), "color: teal;");
    }

    #[test]
    fn test_visibility_hidden_becomes_opacity_zero() {
        let doc = parse_html_with_css("<div>x</div>", "div { visibility: hidden }");
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(cache.style_key(&doc, id), "opacity: 0;");
    }

    #[test]
    fn test_remote_url_neutralized() {
        let doc = parse_html_with_css(
            "<div>x</div>",
            "div { background-image: url(https://example.com/a.png) }",
        );
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        // none matches the initial value, so the property drops out entirely
        assert_eq!(cache.style_key(&doc, id), "");
    }

    #[test]
    fn test_data_url_kept() {
        let doc = parse_html_with_css(
            "<div>x</div>",
            "div { background-image: url(data:image/gif;base64,R0) }",
        );
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(
            cache.style_key(&doc, id),
            "background-image: url(data:image/gif;base64,R0);"
        );
    }

    #[test]
    fn test_denylisted_properties_dropped() {
        let doc = parse_html_with_css(
            "<div>x</div>",
            "div { transition: all 1s; animation-name: spin; color: red }",
        );
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(cache.style_key(&doc, id), "color: red;");
    }

    #[test]
    fn test_identical_styles_share_signature() {
        let doc = parse_html_with_css(
            "<div><p class=\"a\">x</p><p class=\"b\">y</p></div>",
            "p { color: red }",
        );
        let mut cache = StyleCache::new();
        let mut ids = Vec::new();
        for id in doc.descendants(doc.document()) {
            if doc.element_name(id).is_some_and(|n| n.as_ref() == "p") {
                ids.push(id);
            }
        }
        assert_eq!(ids.len(), 2);
        let k1 = cache.style_key(&doc, ids[0]);
        let k2 = cache.style_key(&doc, ids[1]);
        assert_eq!(k1, k2);
        // One signature for both elements plus none recomputed
        assert_eq!(cache.signature_count(), 1);
    }

    #[test]
    fn test_epoch_invalidation_keeps_signatures() {
        let mut doc = parse_html_with_css("<div>x</div>", "div { color: red }");
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        let before = cache.style_key(&doc, id);

        doc.bump_epoch();
        let after = cache.style_key(&doc, id);
        assert_eq!(before, after);
        assert_eq!(cache.signature_count(), 1);
    }

    #[test]
    fn test_key_is_deterministic_order() {
        let doc = parse_html_with_css(
            "<div>x</div>",
            "div { z-index: 3; color: red; background-color: blue }",
        );
        let id = doc.find_by_tag("div").unwrap();
        let mut cache = StyleCache::new();
        assert_eq!(
            cache.style_key(&doc, id),
            "background-color: blue;color: red;z-index: 3;"
        );
    }
}
