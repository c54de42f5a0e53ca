//! Font variant keys and `@font-face` candidates.
//!
//! A [`FontKey`] names one variant the captured text renders with. A
//! [`FaceCandidate`] is one parsed `@font-face` rule (or synthetic face)
//! the embedder may select for it. Matching follows the font-matching
//! rules loosely: family and style must agree, weight and stretch match
//! a declared value or range, and a family with no exact match falls
//! back to its nearest-weight face.

use std::collections::BTreeSet;

use crate::css::background::{find_urls, strip_quotes};
use crate::css::stylesheet::FontFaceRule;
use crate::css::unicode_range::{UnicodeRange, parse_ranges, ranges_intersect, subset_tags};

/// Generic family keywords that never resolve to an embeddable face.
const GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "ui-serif",
    "ui-sans-serif",
    "ui-monospace",
    "ui-rounded",
    "math",
    "emoji",
    "fangsong",
];

// ============================================================================
// Variant keys
// ============================================================================

/// One font variant in use: `(family, weight, style, stretch)`.
///
/// The textual form `family__weight__style__stretchPct` keys the embedder
/// caches and shows up in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontKey {
    pub family: String,
    pub weight: u16,
    pub style: String,
    /// Normalized percentage text: `"100"`, `"112.5"`.
    pub stretch_pct: String,
}

impl FontKey {
    /// Build a key from computed style values. `None` when the primary
    /// family is a generic keyword.
    pub fn from_computed(family: &str, weight: &str, style: &str, stretch: &str) -> Option<Self> {
        let family = primary_family(family)?;
        Some(Self {
            family,
            weight: parse_weight(weight).unwrap_or(400),
            style: normalize_style(style),
            stretch_pct: format_pct(parse_stretch(stretch).unwrap_or(100.0)),
        })
    }

    pub fn tag(&self) -> String {
        format!(
            "{}__{}__{}__{}",
            self.family, self.weight, self.style, self.stretch_pct
        )
    }

    fn stretch_value(&self) -> f64 {
        self.stretch_pct.parse().unwrap_or(100.0)
    }
}

/// First non-generic family of a `font-family` list.
fn primary_family(value: &str) -> Option<String> {
    let first = crate::css::declaration::split_top_level(value, ',')
        .into_iter()
        .next()?;
    let name = strip_quotes(first.trim()).trim();
    if name.is_empty() || GENERIC_FAMILIES.iter().any(|g| name.eq_ignore_ascii_case(g)) {
        return None;
    }
    Some(name.to_string())
}

fn parse_weight(value: &str) -> Option<u16> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("normal") {
        return Some(400);
    }
    if value.eq_ignore_ascii_case("bold") {
        return Some(700);
    }
    let parsed: f64 = value.parse().ok()?;
    if !(1.0..=1000.0).contains(&parsed) {
        return None;
    }
    Some(parsed.round() as u16)
}

fn normalize_style(value: &str) -> String {
    // "oblique 14deg" collapses to its keyword
    value
        .split_whitespace()
        .next()
        .unwrap_or("normal")
        .to_ascii_lowercase()
}

fn parse_stretch(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse().ok();
    }
    let keyword = match value.to_ascii_lowercase().as_str() {
        "ultra-condensed" => 50.0,
        "extra-condensed" => 62.5,
        "condensed" => 75.0,
        "semi-condensed" => 87.5,
        "normal" => 100.0,
        "semi-expanded" => 112.5,
        "expanded" => 125.0,
        "extra-expanded" => 150.0,
        "ultra-expanded" => 200.0,
        _ => return None,
    };
    Some(keyword)
}

fn format_pct(value: f64) -> String {
    if (value - value.round()).abs() < 1e-6 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

// ============================================================================
// Face candidates
// ============================================================================

/// One embeddable `@font-face`, parsed or synthesized.
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub family: String,
    pub weight_min: u16,
    pub weight_max: u16,
    pub style: String,
    pub stretch_min: f64,
    pub stretch_max: f64,
    /// Parsed `unicode-range`; empty means the face covers everything.
    pub ranges: Vec<UnicodeRange>,
    /// Declared `unicode-range` text, re-emitted verbatim.
    pub unicode_range_text: Option<String>,
    /// Raw `src` descriptor.
    pub src: String,
    /// Href of the owning stylesheet. Relative `src` URLs resolve against
    /// it; `None` falls back to the document base URL.
    pub sheet_href: Option<String>,
    /// Supplied by the caller rather than discovered in a stylesheet.
    /// Synthetic faces skip the `embed_fonts` gate.
    pub synthetic: bool,
}

impl FaceCandidate {
    /// Parse a rule into a candidate. Faces without a family or `src` are
    /// unusable and yield `None`.
    pub fn from_rule(rule: &FontFaceRule, sheet_href: Option<&str>) -> Option<Self> {
        let family = strip_quotes(rule.get("font-family")?.trim()).trim().to_string();
        if family.is_empty() {
            return None;
        }
        let src = rule.get("src")?.trim().to_string();
        if src.is_empty() {
            return None;
        }

        let (weight_min, weight_max) = rule
            .get("font-weight")
            .and_then(parse_weight_range)
            .unwrap_or((400, 400));
        let (stretch_min, stretch_max) = rule
            .get("font-stretch")
            .and_then(parse_stretch_range)
            .unwrap_or((100.0, 100.0));
        let unicode_range_text = rule.get("unicode-range").map(|s| s.trim().to_string());
        let ranges = unicode_range_text
            .as_deref()
            .map(parse_ranges)
            .unwrap_or_default();

        Some(Self {
            family,
            weight_min,
            weight_max,
            style: rule
                .get("font-style")
                .map(normalize_style)
                .unwrap_or_else(|| "normal".to_string()),
            stretch_min,
            stretch_max,
            ranges,
            unicode_range_text,
            src,
            sheet_href: sheet_href.map(str::to_string),
            synthetic: false,
        })
    }

    /// A face supplied outside any stylesheet: `local_fonts` entries and
    /// font-set registrations carrying a source payload.
    pub fn synthetic(
        family: &str,
        src: &str,
        weight: Option<&str>,
        style: Option<&str>,
        stretch: Option<&str>,
    ) -> Self {
        let weight = weight.and_then(parse_weight).unwrap_or(400);
        let stretch = stretch.and_then(parse_stretch).unwrap_or(100.0);
        Self {
            family: strip_quotes(family.trim()).trim().to_string(),
            weight_min: weight,
            weight_max: weight,
            style: style.map(normalize_style).unwrap_or_else(|| "normal".to_string()),
            stretch_min: stretch,
            stretch_max: stretch,
            ranges: Vec::new(),
            unicode_range_text: None,
            src: format_src(src),
            sheet_href: None,
            synthetic: true,
        }
    }

    pub fn matches_family(&self, key: &FontKey) -> bool {
        self.family.eq_ignore_ascii_case(&key.family)
    }

    pub fn matches_style(&self, key: &FontKey) -> bool {
        self.style.eq_ignore_ascii_case(&key.style)
            || (key.style == "italic" && self.style.eq_ignore_ascii_case("oblique"))
    }

    pub fn matches_weight(&self, key: &FontKey) -> bool {
        (self.weight_min..=self.weight_max).contains(&key.weight)
    }

    pub fn matches_stretch(&self, key: &FontKey) -> bool {
        let wanted = key.stretch_value();
        wanted >= self.stretch_min - 1e-6 && wanted <= self.stretch_max + 1e-6
    }

    /// Distance from the declared weight range to a requested weight.
    pub fn weight_distance(&self, key: &FontKey) -> u16 {
        if self.matches_weight(key) {
            0
        } else if key.weight < self.weight_min {
            self.weight_min - key.weight
        } else {
            key.weight - self.weight_max
        }
    }

    /// Whether the declared coverage intersects the captured codepoints.
    /// Faces with no declared range always qualify.
    pub fn covers(&self, used: &BTreeSet<u32>) -> bool {
        self.ranges.is_empty() || ranges_intersect(&self.ranges, used)
    }

    pub fn subset_tags(&self) -> Vec<&'static str> {
        subset_tags(&self.ranges)
    }

    /// Whether `src` references anything fetchable. Pure `local(...)` faces
    /// are emitted unchanged.
    pub fn has_remote_src(&self) -> bool {
        !find_urls(&self.src).is_empty()
    }

    /// Serialize the face with a rewritten `src` descriptor.
    pub fn emit(&self, src: &str) -> String {
        let mut css = String::from("@font-face{");
        css.push_str(&format!("font-family:\"{}\";", self.family));
        css.push_str(&format!("font-style:{};", self.style));
        if self.weight_min == self.weight_max {
            css.push_str(&format!("font-weight:{};", self.weight_min));
        } else {
            css.push_str(&format!(
                "font-weight:{} {};",
                self.weight_min, self.weight_max
            ));
        }
        if (self.stretch_min - 100.0).abs() > 1e-6 || (self.stretch_max - 100.0).abs() > 1e-6 {
            if (self.stretch_min - self.stretch_max).abs() < 1e-6 {
                css.push_str(&format!("font-stretch:{}%;", format_pct(self.stretch_min)));
            } else {
                css.push_str(&format!(
                    "font-stretch:{}% {}%;",
                    format_pct(self.stretch_min),
                    format_pct(self.stretch_max)
                ));
            }
        }
        if let Some(range) = &self.unicode_range_text {
            css.push_str(&format!("unicode-range:{range};"));
        }
        css.push_str(&format!("src:{src};"));
        css.push('}');
        css
    }
}

fn parse_weight_range(value: &str) -> Option<(u16, u16)> {
    let mut parts = value.split_whitespace();
    let first = parse_weight(parts.next()?)?;
    match parts.next() {
        Some(second) => {
            let second = parse_weight(second)?;
            Some((first.min(second), first.max(second)))
        }
        None => Some((first, first)),
    }
}

fn parse_stretch_range(value: &str) -> Option<(f64, f64)> {
    let mut parts = value.split_whitespace();
    let first = parse_stretch(parts.next()?)?;
    match parts.next() {
        Some(second) => {
            let second = parse_stretch(second)?;
            Some((first.min(second), first.max(second)))
        }
        None => Some((first, first)),
    }
}

/// Wrap a caller-supplied source into a `src` descriptor unless it already
/// is one.
fn format_src(src: &str) -> String {
    let trimmed = src.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("url(") || lower.starts_with("local(") {
        trimmed.to_string()
    } else {
        format!("url(\"{trimmed}\")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::stylesheet::Stylesheet;

    fn first_face(css: &str) -> FaceCandidate {
        let sheet = Stylesheet::parse(css, (1024.0, 768.0));
        FaceCandidate::from_rule(&sheet.font_faces[0], Some("https://cdn.test/fonts.css")).unwrap()
    }

    #[test]
    fn test_key_tag_format() {
        let key = FontKey::from_computed("\"Mansalva\", cursive", "700", "normal", "100%").unwrap();
        assert_eq!(key.tag(), "Mansalva__700__normal__100");
    }

    #[test]
    fn test_generic_family_yields_no_key() {
        assert!(FontKey::from_computed("sans-serif", "400", "normal", "100%").is_none());
        assert!(FontKey::from_computed("", "400", "normal", "100%").is_none());
    }

    #[test]
    fn test_keyword_weight_and_stretch() {
        let key = FontKey::from_computed("Inter", "bold", "italic", "condensed").unwrap();
        assert_eq!(key.weight, 700);
        assert_eq!(key.style, "italic");
        assert_eq!(key.stretch_pct, "75");
    }

    #[test]
    fn test_fractional_stretch_keeps_precision() {
        let key = FontKey::from_computed("Inter", "400", "normal", "112.5%").unwrap();
        assert_eq!(key.stretch_pct, "112.5");
        assert_eq!(key.tag(), "Inter__400__normal__112.5");
    }

    #[test]
    fn test_face_from_rule() {
        let face = first_face(
            "@font-face { font-family: \"Inter\"; font-weight: 100 900; \
             font-style: italic; src: url(inter.woff2) format(\"woff2\"); \
             unicode-range: U+0-7F; }",
        );
        assert_eq!(face.family, "Inter");
        assert_eq!((face.weight_min, face.weight_max), (100, 900));
        assert_eq!(face.style, "italic");
        assert_eq!(face.ranges.len(), 1);
        assert_eq!(face.sheet_href.as_deref(), Some("https://cdn.test/fonts.css"));
    }

    #[test]
    fn test_face_without_src_rejected() {
        let sheet = Stylesheet::parse("@font-face { font-family: X; }", (1024.0, 768.0));
        assert!(FaceCandidate::from_rule(&sheet.font_faces[0], None).is_none());
    }

    #[test]
    fn test_weight_range_matching() {
        let face = first_face(
            "@font-face { font-family: V; font-weight: 300 600; src: url(v.woff2); }",
        );
        let at = |w: u16| FontKey {
            family: "V".to_string(),
            weight: w,
            style: "normal".to_string(),
            stretch_pct: "100".to_string(),
        };
        assert!(face.matches_weight(&at(300)));
        assert!(face.matches_weight(&at(450)));
        assert!(!face.matches_weight(&at(700)));
        assert_eq!(face.weight_distance(&at(700)), 100);
        assert_eq!(face.weight_distance(&at(100)), 200);
    }

    #[test]
    fn test_italic_matches_oblique() {
        let face = first_face(
            "@font-face { font-family: O; font-style: oblique; src: url(o.woff2); }",
        );
        let key = FontKey {
            family: "O".to_string(),
            weight: 400,
            style: "italic".to_string(),
            stretch_pct: "100".to_string(),
        };
        assert!(face.matches_style(&key));
    }

    #[test]
    fn test_coverage_against_codepoints() {
        let face = first_face(
            "@font-face { font-family: C; src: url(c.woff2); unicode-range: U+400-4FF; }",
        );
        let mut used = BTreeSet::new();
        crate::css::unicode_range::collect_codepoints("hello", &mut used);
        assert!(!face.covers(&used));
        crate::css::unicode_range::collect_codepoints("мир", &mut used);
        assert!(face.covers(&used));
    }

    #[test]
    fn test_local_only_src_has_no_remote() {
        let face = first_face(
            "@font-face { font-family: L; src: local(\"Arial\"); }",
        );
        assert!(!face.has_remote_src());
    }

    #[test]
    fn test_emit_single_weight() {
        let face = first_face(
            "@font-face { font-family: Mansalva; font-weight: 400; src: url(m.woff2); }",
        );
        let css = face.emit("url(\"data:font/woff2;base64,AAAA\")");
        assert_eq!(
            css,
            "@font-face{font-family:\"Mansalva\";font-style:normal;font-weight:400;\
             src:url(\"data:font/woff2;base64,AAAA\");}"
        );
    }

    #[test]
    fn test_emit_keeps_unicode_range() {
        let face = first_face(
            "@font-face { font-family: R; src: url(r.woff2); unicode-range: U+0-7F, U+131; }",
        );
        let css = face.emit("url(\"data:font/woff2;base64,AAAA\")");
        assert!(css.contains("unicode-range:U+0-7F, U+131;"));
    }

    #[test]
    fn test_synthetic_face_wraps_bare_url() {
        let face = FaceCandidate::synthetic("My Font", "https://x.test/f.woff2", Some("700"), None, None);
        assert_eq!(face.src, "url(\"https://x.test/f.woff2\")");
        assert_eq!((face.weight_min, face.weight_max), (700, 700));
        assert!(face.has_remote_src());
    }
}
