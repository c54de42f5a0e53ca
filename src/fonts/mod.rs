//! Web font embedding.
//!
//! The capture scans the source subtree for the font variants its text
//! actually renders with, then builds a minimal `@font-face` CSS block:
//! candidate rules come from readable document stylesheets, cross-origin
//! stylesheet links that look like font CSS, `@import`ed sheets, caller
//! `local_fonts`, and font-set registrations carrying a source payload.
//! Selected faces get their binaries inlined as `data:` URLs. With
//! `embed_fonts` off only icon faces survive; icon fonts always embed
//! because their glyphs are content, not decoration.

use std::collections::{BTreeSet, HashMap, HashSet};

use sha1_smol::Sha1;

use crate::capture::pseudo::{ContentPiece, parse_content};
use crate::css::background::{find_urls, format_url, replace_urls};
use crate::css::declaration::split_top_level;
use crate::css::stylesheet::Stylesheet;
use crate::css::unicode_range::collect_codepoints;
use crate::dom::node::StyleMap;
use crate::dom::{Document, NodeId};
use crate::fetch::FetchOptions;
use crate::options::{CaptureOptions, FontExclusions, LocalFont, PreCacheOptions};
use crate::runtime::CaptureRuntime;
use crate::util::{idle, resolve_url};

pub mod face;

pub use face::{FaceCandidate, FontKey};

/// Family name fragments that mark a face as an icon font.
const ICON_FAMILY_PATTERNS: &[&str] = &[
    "fontawesome",
    "font awesome",
    "material icons",
    "material symbols",
    "ionicons",
    "glyphicons",
    "bootstrap icons",
    "remixicon",
    "heroicons",
    "feather",
    "lucide",
];

/// Source URL fragments that mark a face as an icon font.
const ICON_URL_PATTERNS: &[&str] = &[
    "fontawesome",
    "font-awesome",
    "material-icons",
    "materialicons",
    "material-symbols",
    "ionicons",
    "glyphicons",
    "bootstrap-icons",
    "remixicon",
];

// ============================================================================
// Subtree scan
// ============================================================================

/// Font variants and codepoints one capture needs.
#[derive(Debug, Default)]
pub struct FontScan {
    pub required: BTreeSet<FontKey>,
    pub codepoints: BTreeSet<u32>,
}

/// Walk the source subtree, shadow trees included, collecting the variant
/// of every element and pseudo-element plus every text codepoint. Pseudo
/// `content` strings count as text.
pub fn scan_subtree(src: &Document, root: NodeId) -> FontScan {
    let mut scan = FontScan::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(text) = src.text_content(id) {
            collect_codepoints(text, &mut scan.codepoints);
        }
        if let Some(el) = src.element(id) {
            record_variant(&el.computed, None, &mut scan.required);
            for (_, map) in &el.pseudos {
                record_variant(map, Some(&el.computed), &mut scan.required);
                if let Some(content) = map.get("content") {
                    for piece in parse_content(content) {
                        if let ContentPiece::Text(text) = piece {
                            collect_codepoints(&text, &mut scan.codepoints);
                        }
                    }
                }
            }
            if let Some(shadow) = el.shadow_root {
                stack.push(shadow);
            }
        }
        stack.extend(src.children(id));
    }
    scan
}

/// Record the variant a computed map renders with. Pseudo maps fall back
/// to their owner for undeclared font properties.
fn record_variant(map: &StyleMap, fallback: Option<&StyleMap>, required: &mut BTreeSet<FontKey>) {
    let get = |prop: &str| {
        map.get(prop)
            .or_else(|| fallback.and_then(|f| f.get(prop)))
            .map(String::as_str)
    };
    let Some(family) = get("font-family") else {
        return;
    };
    if let Some(key) = FontKey::from_computed(
        family,
        get("font-weight").unwrap_or("400"),
        get("font-style").unwrap_or("normal"),
        get("font-stretch").unwrap_or("100%"),
    ) {
        required.insert(key);
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Font knobs shared by capture and pre-cache paths.
pub struct FontEmbedConfig<'a> {
    pub embed_all: bool,
    pub icon_fonts: &'a [String],
    pub local_fonts: &'a [LocalFont],
    pub exclusions: Option<&'a FontExclusions>,
    pub proxy: &'a str,
}

impl<'a> FontEmbedConfig<'a> {
    pub fn from_capture(options: &'a CaptureOptions) -> Self {
        Self {
            embed_all: options.embed_fonts,
            icon_fonts: &options.icon_fonts,
            local_fonts: &options.local_fonts,
            exclusions: options.exclude_fonts.as_ref(),
            proxy: &options.use_proxy,
        }
    }

    pub fn from_pre_cache(options: &'a PreCacheOptions) -> Self {
        Self {
            embed_all: options.embed_fonts,
            icon_fonts: &options.icon_fonts,
            local_fonts: &options.local_fonts,
            exclusions: options.exclude_fonts.as_ref(),
            proxy: &options.use_proxy,
        }
    }
}

/// Build the `@font-face` CSS for one capture. Returns an empty string
/// when no variant needs embedding; never fails, faces that cannot be
/// resolved are dropped one by one.
pub async fn embed_fonts(
    runtime: &CaptureRuntime,
    doc: &Document,
    scan: &FontScan,
    config: &FontEmbedConfig<'_>,
) -> String {
    if scan.required.is_empty() {
        return String::new();
    }

    let sheets = gather_sheets(runtime, doc, config.proxy).await;

    let signature = input_signature(doc, scan, config, &sheets);
    if let Some(hit) = runtime.cached_font_css(&signature) {
        return hit;
    }

    let mut candidates: Vec<FaceCandidate> = Vec::new();
    for source in &sheets {
        for rule in &source.sheet.font_faces {
            if let Some(candidate) = FaceCandidate::from_rule(rule, source.href.as_deref()) {
                candidates.push(candidate);
            }
        }
    }
    for font in config.local_fonts {
        candidates.push(FaceCandidate::synthetic(
            &font.family,
            &font.src,
            font.weight.as_deref(),
            font.style.as_deref(),
            font.stretch_pct.as_deref(),
        ));
    }
    for registered in &doc.font_set {
        if let Some(src) = &registered.snapdom_src {
            candidates.push(FaceCandidate::synthetic(
                &registered.family,
                src,
                Some(&registered.weight),
                Some(&registered.style),
                Some(&registered.stretch),
            ));
        }
    }

    let chosen = select_faces(scan, config, &candidates);

    let base = doc.base_url.as_deref();
    let blocks = futures::future::join_all(
        chosen
            .iter()
            .map(|face| inline_face(runtime, config.proxy, base, face)),
    )
    .await;

    let mut emitted: HashSet<String> = HashSet::new();
    let mut css = String::new();
    for block in blocks.into_iter().flatten() {
        if emitted.insert(block.clone()) {
            css.push_str(&block);
        }
    }

    runtime.store_font_css(&signature, &css);
    css
}

/// Pre-resolve the sources of the given families so later captures hit
/// warm caches. `passes` repeats the resolution round; repeats are cache
/// hits and exist to mirror the metric-settling warm-up of live pages.
pub async fn ensure_fonts_ready(
    runtime: &CaptureRuntime,
    doc: &Document,
    families: &[String],
    passes: u32,
) {
    if families.is_empty() || passes == 0 {
        return;
    }
    let sheets = gather_sheets(runtime, doc, "").await;
    let base = doc.base_url.as_deref();
    for _ in 0..passes {
        for source in &sheets {
            for rule in &source.sheet.font_faces {
                let Some(face) = FaceCandidate::from_rule(rule, source.href.as_deref()) else {
                    continue;
                };
                if !families.iter().any(|f| f.eq_ignore_ascii_case(&face.family)) {
                    continue;
                }
                let sheet_base = face.sheet_href.as_deref().or(base);
                for span in find_urls(&face.src) {
                    if span.url.starts_with("data:") {
                        continue;
                    }
                    let url = resolve_url(sheet_base, &span.url);
                    fetch_font_url(runtime, "", &url).await;
                }
            }
        }
        idle(false).await;
    }
}

// ============================================================================
// Sheet gathering
// ============================================================================

struct SheetSource {
    href: Option<String>,
    text: String,
    sheet: Stylesheet,
}

/// Collect every stylesheet the embedder may read: inline and readable
/// linked sheets, cross-origin links that look like font CSS, and the
/// `@import`s reachable from all of those. Import fetches are memoized by
/// the fetch layer, so priming costs the network once per URL.
async fn gather_sheets(runtime: &CaptureRuntime, doc: &Document, proxy: &str) -> Vec<SheetSource> {
    let mut sources: Vec<SheetSource> = Vec::new();
    let mut queue: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    for sheet in &doc.stylesheets {
        if let Some(text) = &sheet.text {
            let source = parse_source(
                sheet.href.clone(),
                text.clone(),
                doc,
            );
            queue_imports(&source, doc, &mut queue, &mut visited);
            sources.push(source);
        } else if let Some(href) = &sheet.href {
            if !looks_like_font_css(href) {
                continue;
            }
            if let Some(text) = fetch_sheet(runtime, proxy, href).await {
                let source = parse_source(Some(href.clone()), text, doc);
                queue_imports(&source, doc, &mut queue, &mut visited);
                sources.push(source);
            }
        }
    }

    while let Some(url) = queue.pop() {
        if runtime.mark_import(&url) {
            log::debug!("priming @import {url}");
        }
        if let Some(text) = fetch_sheet(runtime, proxy, &url).await {
            let source = parse_source(Some(url), text, doc);
            queue_imports(&source, doc, &mut queue, &mut visited);
            sources.push(source);
        }
    }

    sources
}

fn parse_source(href: Option<String>, text: String, doc: &Document) -> SheetSource {
    let sheet = Stylesheet::parse(&text, doc.viewport);
    SheetSource { href, text, sheet }
}

fn queue_imports(
    source: &SheetSource,
    doc: &Document,
    queue: &mut Vec<String>,
    visited: &mut HashSet<String>,
) {
    let base = source.href.as_deref().or(doc.base_url.as_deref());
    for import in &source.sheet.imports {
        let url = resolve_url(base, import);
        if visited.insert(url.clone()) {
            queue.push(url);
        }
    }
}

/// Cross-origin stylesheet links are only fetched when they plausibly
/// carry fonts: a `.css` path or a hosted-font `family=` query.
fn looks_like_font_css(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    path.ends_with(".css") || lower.contains("family=")
}

async fn fetch_sheet(runtime: &CaptureRuntime, proxy: &str, url: &str) -> Option<String> {
    let mut options = FetchOptions::text();
    if !proxy.is_empty() {
        options = options.with_proxy(proxy);
    }
    let record = runtime.fetch(url, &options).await;
    record.as_text().map(str::to_string)
}

// ============================================================================
// Face selection
// ============================================================================

/// Pick the faces to embed: per required variant, every exact match, or
/// the family's nearest-weight face when no exact match exists.
fn select_faces<'a>(
    scan: &FontScan,
    config: &FontEmbedConfig<'_>,
    candidates: &'a [FaceCandidate],
) -> Vec<&'a FaceCandidate> {
    let mut chosen: Vec<&FaceCandidate> = Vec::new();
    let mut taken: HashSet<usize> = HashSet::new();

    for key in &scan.required {
        let eligible: Vec<(usize, &FaceCandidate)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, f)| f.matches_family(key))
            .filter(|(_, f)| f.matches_style(key))
            .filter(|(_, f)| {
                config.embed_all || f.synthetic || is_icon_face(f, config.icon_fonts)
            })
            .filter(|(_, f)| !is_excluded(f, config.exclusions))
            .filter(|(_, f)| f.covers(&scan.codepoints))
            .collect();
        if eligible.is_empty() {
            continue;
        }

        let exact: Vec<(usize, &FaceCandidate)> = eligible
            .iter()
            .filter(|(_, f)| f.matches_weight(key) && f.matches_stretch(key))
            .cloned()
            .collect();
        let picks: Vec<(usize, &FaceCandidate)> = if exact.is_empty() {
            eligible
                .into_iter()
                .min_by_key(|(i, f)| (f.weight_distance(key), *i))
                .into_iter()
                .collect()
        } else {
            exact
        };

        for (index, face) in picks {
            if taken.insert(index) {
                chosen.push(face);
            }
        }
    }

    chosen
}

fn is_icon_face(face: &FaceCandidate, extra: &[String]) -> bool {
    let family = face.family.to_ascii_lowercase();
    if extra.iter().any(|name| {
        let name = name.to_ascii_lowercase();
        !name.is_empty() && family.contains(&name)
    }) {
        return true;
    }
    if ICON_FAMILY_PATTERNS.iter().any(|p| family.contains(p)) {
        return true;
    }
    let src = face.src.to_ascii_lowercase();
    ICON_URL_PATTERNS.iter().any(|p| src.contains(p))
}

fn is_excluded(face: &FaceCandidate, exclusions: Option<&FontExclusions>) -> bool {
    let Some(ex) = exclusions else {
        return false;
    };
    if ex
        .families
        .iter()
        .any(|family| family.eq_ignore_ascii_case(&face.family))
    {
        return true;
    }
    if !ex.domains.is_empty() {
        let domains: Vec<String> = ex.domains.iter().map(|d| d.to_ascii_lowercase()).collect();
        let excluded = find_urls(&face.src).iter().any(|span| {
            let absolute = resolve_url(face.sheet_href.as_deref(), &span.url);
            let host = url::Url::parse(&absolute)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
                .unwrap_or_else(|| absolute.to_ascii_lowercase());
            domains.iter().any(|d| host.contains(d))
        });
        if excluded {
            return true;
        }
    }
    if !ex.subsets.is_empty() {
        let tags = face.subset_tags();
        if tags
            .iter()
            .any(|tag| ex.subsets.iter().any(|s| s.eq_ignore_ascii_case(tag)))
        {
            return true;
        }
    }
    false
}

// ============================================================================
// Source inlining
// ============================================================================

/// Inline one face's sources and emit its block. Format entries whose
/// fetch failed drop out; a face left with no sources drops entirely.
/// Pure `local(...)` faces emit unchanged.
async fn inline_face(
    runtime: &CaptureRuntime,
    proxy: &str,
    base: Option<&str>,
    face: &FaceCandidate,
) -> Option<String> {
    if !face.has_remote_src() {
        return Some(face.emit(&face.src));
    }
    let sheet_base = face.sheet_href.as_deref().or(base);

    let mut resolved: HashMap<String, String> = HashMap::new();
    for span in find_urls(&face.src) {
        if span.url.starts_with("data:") {
            continue;
        }
        let url = resolve_url(sheet_base, &span.url);
        if resolved.contains_key(&url) {
            continue;
        }
        if let Some(inlined) = fetch_font_url(runtime, proxy, &url).await {
            resolved.insert(url, inlined);
        }
    }

    let mut kept: Vec<String> = Vec::new();
    for entry in split_top_level(&face.src, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if find_urls(entry).is_empty() {
            kept.push(entry.to_string());
            continue;
        }
        let mut missing = false;
        let rewritten = replace_urls(entry, |url| {
            if url.starts_with("data:") {
                return None;
            }
            match resolved.get(&resolve_url(sheet_base, url)) {
                Some(inlined) => Some(format_url(inlined)),
                None => {
                    missing = true;
                    None
                }
            }
        });
        if !missing {
            kept.push(rewritten);
        }
    }

    if kept.is_empty() {
        log::warn!("dropping font face \"{}\": no reachable source", face.family);
        return None;
    }
    Some(face.emit(&kept.join(", ")))
}

async fn fetch_font_url(runtime: &CaptureRuntime, proxy: &str, url: &str) -> Option<String> {
    if let Some(hit) = runtime.cached_font_url(url) {
        return Some(hit);
    }
    let mut options = FetchOptions::data_url();
    if !proxy.is_empty() {
        options = options.with_proxy(proxy);
    }
    let record = runtime.fetch(url, &options).await;
    let inlined = record.as_data_url()?.to_string();
    runtime.store_font_url(url, &inlined);
    Some(inlined)
}

// ============================================================================
// Input signature
// ============================================================================

/// Hash of everything the output depends on: required variants, used
/// codepoints, exclusions, the gate, caller fonts, and sheet texts.
fn input_signature(
    doc: &Document,
    scan: &FontScan,
    config: &FontEmbedConfig<'_>,
    sheets: &[SheetSource],
) -> String {
    let mut hasher = Sha1::new();
    for key in &scan.required {
        hasher.update(key.tag().as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"|");
    for cp in &scan.codepoints {
        hasher.update(&cp.to_le_bytes());
    }
    hasher.update(b"|");
    hasher.update(if config.embed_all { b"all" } else { b"icon" });
    for name in config.icon_fonts {
        hasher.update(name.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"|");
    if let Some(ex) = config.exclusions {
        for family in &ex.families {
            hasher.update(family.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"/");
        for domain in &ex.domains {
            hasher.update(domain.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"/");
        for subset in &ex.subsets {
            hasher.update(subset.as_bytes());
            hasher.update(b",");
        }
    }
    hasher.update(b"|");
    for font in config.local_fonts {
        hasher.update(font.family.as_bytes());
        hasher.update(b"=");
        hasher.update(font.src.as_bytes());
        hasher.update(b",");
    }
    for registered in &doc.font_set {
        if let Some(src) = &registered.snapdom_src {
            hasher.update(registered.family.as_bytes());
            hasher.update(b"=");
            hasher.update(src.as_bytes());
            hasher.update(b",");
        }
    }
    hasher.update(b"|");
    for source in sheets {
        hasher.update(source.text.as_bytes());
        hasher.update(b"\n");
    }
    hasher.digest().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dom::builder::DocumentBuilder;
    use crate::fetch::StaticFetcher;

    const WOFF2_DATA: &str = "data:font/woff2;base64,d09GMgABAAAAAA==";

    fn required(tag_parts: (&str, u16, &str, &str)) -> FontScan {
        let mut scan = FontScan::default();
        scan.required.insert(FontKey {
            family: tag_parts.0.to_string(),
            weight: tag_parts.1,
            style: tag_parts.2.to_string(),
            stretch_pct: tag_parts.3.to_string(),
        });
        collect_codepoints("test", &mut scan.codepoints);
        scan
    }

    fn embed_config(options: &CaptureOptions) -> FontEmbedConfig<'_> {
        FontEmbedConfig::from_capture(options)
    }

    fn doc_with_sheet(css: &str) -> Document {
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "test");
        b.stylesheet(css);
        b.finish()
    }

    #[tokio::test]
    async fn test_nearest_weight_picks_single_family_face() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: Mansalva; font-weight: 400; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("Mansalva", 700, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert_eq!(css.matches("@font-face").count(), 1);
        assert!(css.contains("font-weight:400;"));
        assert!(css.contains(WOFF2_DATA));
    }

    #[tokio::test]
    async fn test_exact_weight_range_match() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: V; font-weight: 100 900; src: url({WOFF2_DATA}); }}\
             @font-face {{ font-family: V; font-weight: 400; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("V", 700, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        // The variable face covers 700; the 400 face does not match exactly.
        assert_eq!(css.matches("@font-face").count(), 1);
        assert!(css.contains("font-weight:100 900;"));
    }

    #[tokio::test]
    async fn test_embed_gate_keeps_icon_faces_only() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: Roboto; src: url({WOFF2_DATA}); }}\
             @font-face {{ font-family: \"Font Awesome 6 Free\"; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(false);
        let mut scan = required(("Roboto", 400, "normal", "100"));
        scan.required.insert(FontKey {
            family: "Font Awesome 6 Free".to_string(),
            weight: 400,
            style: "normal".to_string(),
            stretch_pct: "100".to_string(),
        });

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("Font Awesome 6 Free"));
        assert!(!css.contains("Roboto"));
    }

    #[tokio::test]
    async fn test_user_icon_font_list_extends_heuristic() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: GlyphCo; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new()
            .with_embed_fonts(false)
            .with_icon_font("GlyphCo");
        let scan = required(("GlyphCo", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("GlyphCo"));
    }

    #[tokio::test]
    async fn test_excluded_family_dropped() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: Tracked; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new()
            .with_embed_fonts(true)
            .with_exclude_fonts(FontExclusions {
                families: vec!["tracked".to_string()],
                ..FontExclusions::default()
            });
        let scan = required(("Tracked", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_domain_dropped() {
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://fonts.gstatic.com/f.woff2",
            vec![0u8; 8],
            Some("font/woff2"),
        ));
        let doc = doc_with_sheet(
            "@font-face { font-family: Hosted; src: url(https://fonts.gstatic.com/f.woff2); }",
        );
        let runtime = CaptureRuntime::new(fetcher);
        let options = CaptureOptions::new()
            .with_embed_fonts(true)
            .with_exclude_fonts(FontExclusions {
                domains: vec!["gstatic".to_string()],
                ..FontExclusions::default()
            });
        let scan = required(("Hosted", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_subset_dropped() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: S; src: url({WOFF2_DATA}); \
             unicode-range: U+0301, U+0400-045F, U+0490-0491, U+2116; }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new()
            .with_embed_fonts(true)
            .with_exclude_fonts(FontExclusions {
                subsets: vec!["cyrillic".to_string()],
                ..FontExclusions::default()
            });
        let mut scan = required(("S", 400, "normal", "100"));
        collect_codepoints("привет", &mut scan.codepoints);

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.is_empty());
    }

    #[tokio::test]
    async fn test_uncovered_range_dropped() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: C; src: url({WOFF2_DATA}); unicode-range: U+400-4FF; }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("C", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.is_empty());
    }

    #[tokio::test]
    async fn test_remote_src_inlined_through_cache() {
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://cdn.test/inter.woff2",
            vec![1u8, 2, 3, 4],
            Some("font/woff2"),
        ));
        let doc = doc_with_sheet(
            "@font-face { font-family: Inter; src: url(https://cdn.test/inter.woff2) format(\"woff2\"); }",
        );
        let runtime = CaptureRuntime::new(fetcher.clone());
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("Inter", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("src:url(\"data:font/woff2;base64,"));
        assert!(css.contains("format(\"woff2\")"));
        assert!(runtime.cached_font_url("https://cdn.test/inter.woff2").is_some());
        assert_eq!(fetcher.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_face_dropped_others_survive() {
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://cdn.test/good.woff2",
            vec![1u8; 4],
            Some("font/woff2"),
        ));
        let doc = doc_with_sheet(
            "@font-face { font-family: Good; src: url(https://cdn.test/good.woff2); }\
             @font-face { font-family: Bad; src: url(https://cdn.test/missing.woff2); }",
        );
        let runtime = CaptureRuntime::new(fetcher);
        let options = CaptureOptions::new().with_embed_fonts(true);
        let mut scan = required(("Good", 400, "normal", "100"));
        scan.required.insert(FontKey {
            family: "Bad".to_string(),
            weight: 400,
            style: "normal".to_string(),
            stretch_pct: "100".to_string(),
        });

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("Good"));
        assert!(!css.contains("Bad"));
    }

    #[tokio::test]
    async fn test_local_only_face_passes_through() {
        let doc = doc_with_sheet(
            "@font-face { font-family: L; src: local(\"Arial\"); }",
        );
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("L", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("src:local(\"Arial\");"));
    }

    #[tokio::test]
    async fn test_local_fonts_bypass_embed_gate() {
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "test");
        let doc = b.finish();
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new()
            .with_embed_fonts(false)
            .with_local_font(LocalFont::new("Custom", WOFF2_DATA));
        let scan = required(("Custom", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("Custom"));
        assert!(css.contains(WOFF2_DATA));
    }

    #[tokio::test]
    async fn test_font_set_snapdom_src_embedded() {
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "test");
        let mut face = crate::dom::node::RuntimeFontFace::new("Runtime");
        face.snapdom_src = Some(WOFF2_DATA.to_string());
        let mut doc = b.finish();
        doc.add_font_face(face);
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(false);
        let scan = required(("Runtime", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("Runtime"));
    }

    #[tokio::test]
    async fn test_cross_origin_font_link_fetched() {
        let sheet_css = format!(
            "@font-face {{ font-family: Hosted; src: url({WOFF2_DATA}); }}"
        );
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://fonts.host/css2?family=Hosted",
            sheet_css.into_bytes(),
            Some("text/css"),
        ));
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "test");
        b.linked_stylesheet("https://fonts.host/css2?family=Hosted", None, false);
        let doc = b.finish();
        let runtime = CaptureRuntime::new(fetcher);
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("Hosted", 400, "normal", "100"));

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(css.contains("Hosted"));
    }

    #[tokio::test]
    async fn test_import_resolved_and_fetched_once() {
        let imported = format!(
            "@font-face {{ font-family: Imported; src: url({WOFF2_DATA}); }}"
        );
        let fetcher = Arc::new(StaticFetcher::new().with(
            "https://page.test/fonts/extra.css",
            imported.into_bytes(),
            Some("text/css"),
        ));
        let mut b = DocumentBuilder::new().base_url("https://page.test/");
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "test");
        b.stylesheet("@import url(\"fonts/extra.css\");");
        let doc = b.finish();
        let runtime = CaptureRuntime::new(fetcher.clone());
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("Imported", 400, "normal", "100"));

        let first = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;
        let second = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;

        assert!(first.contains("Imported"));
        assert_eq!(second, first);
        // Import text is memoized by the fetch layer after the priming hit.
        assert_eq!(fetcher.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_identical_inputs_short_circuit_via_css_cache() {
        let doc = doc_with_sheet(&format!(
            "@font-face {{ font-family: Memo; src: url({WOFF2_DATA}); }}"
        ));
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = required(("Memo", 400, "normal", "100"));

        let first = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;
        assert!(!first.is_empty());

        let second = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_no_required_variants_yields_empty() {
        let doc = doc_with_sheet("@font-face { font-family: X; src: url(x.woff2); }");
        let runtime = CaptureRuntime::default();
        let options = CaptureOptions::new().with_embed_fonts(true);
        let scan = FontScan::default();

        let css = embed_fonts(&runtime, &doc, &scan, &embed_config(&options)).await;
        assert!(css.is_empty());
    }

    #[test]
    fn test_scan_collects_variants_and_codepoints() {
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "Hi");
        b.set_style(div, "font-family", "\"Inter\", sans-serif");
        b.set_style(div, "font-weight", "700");
        b.pseudo(div, crate::dom::node::PseudoKind::Before, &[
            ("content", "\"\\2764\""),
            ("font-family", "NotoEmoji"),
        ]);
        let doc = b.finish();

        let scan = scan_subtree(&doc, div);

        let tags: Vec<String> = scan.required.iter().map(FontKey::tag).collect();
        assert!(tags.contains(&"Inter__700__normal__100".to_string()));
        assert!(tags.contains(&"NotoEmoji__700__normal__100".to_string()));
        assert!(scan.codepoints.contains(&('H' as u32)));
        assert!(scan.codepoints.contains(&0x2764));
    }

    #[test]
    fn test_scan_skips_generic_families() {
        let mut b = DocumentBuilder::new();
        let body = b.body();
        let div = b.element(body, "div");
        b.text(div, "x");
        b.set_style(div, "font-family", "sans-serif");
        let doc = b.finish();

        let scan = scan_subtree(&doc, div);
        assert!(scan.required.is_empty());
    }

    #[test]
    fn test_looks_like_font_css() {
        assert!(looks_like_font_css("https://cdn.test/app.css"));
        assert!(looks_like_font_css("https://cdn.test/app.CSS?v=3"));
        assert!(looks_like_font_css("https://fonts.host/css2?family=Inter"));
        assert!(!looks_like_font_css("https://cdn.test/app.js"));
    }
}
