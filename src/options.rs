//! Capture configuration.
//!
//! [`CaptureOptions`] is the single knob surface shared by the library API,
//! the CLI (`--options` JSON), and the wasm entry point. The JSON schema uses
//! camelCase keys; unknown keys are ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dom::node::ElementData;
use crate::error::Error;

// ============================================================================
// Filter surface
// ============================================================================

/// Read-only view of a source element offered to [`NodeFilter`] predicates.
pub struct ElementView<'a> {
    element: &'a ElementData,
}

impl<'a> ElementView<'a> {
    pub(crate) fn new(element: &'a ElementData) -> Self {
        Self { element }
    }

    /// Local tag name, lowercase.
    pub fn tag(&self) -> &str {
        self.element.tag()
    }

    pub fn id(&self) -> Option<&str> {
        self.element.id.as_deref()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.element.classes.iter().map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.element.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element.attr(name)
    }

    /// Computed style lookup.
    pub fn style(&self, property: &str) -> Option<&str> {
        self.element.style(property)
    }
}

/// Predicate deciding whether an element is kept in the capture.
/// Returning `false` applies [`CaptureOptions::filter_mode`].
pub type NodeFilter = Arc<dyn Fn(&ElementView<'_>) -> bool + Send + Sync>;

/// How excluded or filtered-out nodes leave the clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ExcludeMode {
    /// Replace with an invisible spacer sized to the source rect.
    #[default]
    Hide,
    /// Drop the node entirely; surrounding layout may reflow.
    Remove,
}

impl FromStr for ExcludeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hide" => Ok(ExcludeMode::Hide),
            "remove" => Ok(ExcludeMode::Remove),
            other => Err(Error::InvalidInput(format!(
                "unknown exclude mode '{other}' (expected hide or remove)"
            ))),
        }
    }
}

// ============================================================================
// Cache and fallback policy
// ============================================================================

/// What survives from previous captures when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum CachePolicy {
    /// Reset everything, including fetched resources.
    Disabled,
    /// Reset session maps and image/background caches; keep resources.
    #[default]
    Soft,
    /// Reset session maps only.
    Auto,
    /// Keep all caches.
    Full,
}

/// Source substituted for an `<img>` whose fetch failed.
#[derive(Clone)]
pub enum FallbackUrl {
    /// A fixed URL (typically a data URL).
    Fixed(String),
    /// Computed from the failed image's pixel dimensions.
    Compute(Arc<dyn Fn(u32, u32) -> String + Send + Sync>),
}

impl FallbackUrl {
    pub fn resolve(&self, width: u32, height: u32) -> String {
        match self {
            FallbackUrl::Fixed(url) => url.clone(),
            FallbackUrl::Compute(f) => f(width, height),
        }
    }
}

impl fmt::Debug for FallbackUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackUrl::Fixed(url) => f.debug_tuple("Fixed").field(url).finish(),
            FallbackUrl::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

// ============================================================================
// Font scoping hints
// ============================================================================

/// A font supplied directly by the caller, bypassing stylesheet discovery.
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct LocalFont {
    pub family: String,
    /// Font source URL or data URL.
    pub src: String,
    pub weight: Option<String>,
    pub style: Option<String>,
    pub stretch_pct: Option<String>,
}

impl LocalFont {
    pub fn new(family: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            src: src.into(),
            weight: None,
            style: None,
            stretch_pct: None,
        }
    }
}

/// Faces the embedder must drop even when they match a required variant.
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct FontExclusions {
    /// Family names, case-insensitive.
    pub families: Vec<String>,
    /// Host substrings matched against each src URL.
    pub domains: Vec<String>,
    /// Unicode-range derived subset tags (latin, cyrillic-ext, ...).
    pub subsets: Vec<String>,
}

// ============================================================================
// Export knobs
// ============================================================================

/// Output encodings understood by the exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ExportFormat {
    Svg,
    #[default]
    Png,
    #[cfg_attr(any(feature = "cli", feature = "wasm"), serde(alias = "jpeg"))]
    Jpg,
    Webp,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Png => "image/png",
            ExportFormat::Jpg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Svg => "svg",
            ExportFormat::Png => "png",
            ExportFormat::Jpg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(ExportFormat::Svg),
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpg),
            "webp" => Ok(ExportFormat::Webp),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

// ============================================================================
// Capture options
// ============================================================================

/// Everything a capture recognizes. Construct with [`CaptureOptions::new`]
/// and chain `with_*` setters, or deserialize from JSON (camelCase keys).
#[derive(Clone)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct CaptureOptions {
    /// Skip cooperative yields between phases.
    pub fast: bool,
    /// Raster scale applied on export.
    pub scale: f64,
    /// Device pixel ratio for canvas backing stores.
    pub dpr: f64,
    /// Target output width; height derives from aspect when unset.
    pub width: Option<f64>,
    /// Target output height; width derives from aspect when unset.
    pub height: Option<f64>,
    /// Embed matching non-icon `@font-face` rules into the SVG.
    pub embed_fonts: bool,
    /// CSS selectors removed or hidden from the capture.
    pub exclude: Vec<String>,
    pub exclude_mode: ExcludeMode,
    /// Predicate counterpart of `exclude`.
    #[cfg_attr(any(feature = "cli", feature = "wasm"), serde(skip))]
    pub filter: Option<NodeFilter>,
    pub filter_mode: ExcludeMode,
    /// Render failed images as a gray "img" stub instead of a spacer.
    pub placeholders: bool,
    /// Proxy URL template for CORS fallback (`{url}` placeholder, or a
    /// `?`/`/` suffixed carrier).
    pub use_proxy: String,
    /// Extra family names treated as icon fonts (always embedded).
    pub icon_fonts: Vec<String>,
    /// Caller-supplied fonts, bypassing stylesheet discovery.
    pub local_fonts: Vec<LocalFont>,
    pub exclude_fonts: Option<FontExclusions>,
    /// Cache reset policy applied at session start.
    pub cache: CachePolicy,
    /// When false, strip translate/rotation from the capture root and expand
    /// the viewBox over the scaled/skewed bbox instead.
    pub outer_transforms: bool,
    /// When true, expand the viewBox by shadow/blur/outline bleed; when
    /// false those visuals are stripped from the clone root.
    pub outer_shadows: bool,
    /// Substitute source for images whose fetch failed.
    #[cfg_attr(
        any(feature = "cli", feature = "wasm"),
        serde(deserialize_with = "de_fallback_url")
    )]
    pub fallback_url: Option<FallbackUrl>,
    /// Lossy encoder quality in `0.0..=1.0`.
    pub quality: f64,
    /// Format used by `Snapshot::to` and `download`.
    pub format: ExportFormat,
    /// Basename used by `download` when no path is given.
    pub filename: String,
    /// Backdrop for JPEG export and transparent-hostile consumers.
    pub background_color: Option<String>,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self {
            fast: true,
            scale: 1.0,
            dpr: 1.0,
            width: None,
            height: None,
            embed_fonts: false,
            exclude: Vec::new(),
            exclude_mode: ExcludeMode::Hide,
            filter: None,
            filter_mode: ExcludeMode::Hide,
            placeholders: true,
            use_proxy: String::new(),
            icon_fonts: Vec::new(),
            local_fonts: Vec::new(),
            exclude_fonts: None,
            cache: CachePolicy::Soft,
            outer_transforms: true,
            outer_shadows: false,
            fallback_url: None,
            quality: 0.92,
            format: ExportFormat::Png,
            filename: "capture".to_string(),
            background_color: None,
        }
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_dpr(mut self, dpr: f64) -> Self {
        self.dpr = dpr;
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_embed_fonts(mut self, embed: bool) -> Self {
        self.embed_fonts = embed;
        self
    }

    /// Add a CSS selector whose matches are excluded from the capture.
    pub fn with_exclude(mut self, selector: impl Into<String>) -> Self {
        self.exclude.push(selector.into());
        self
    }

    pub fn with_exclude_mode(mut self, mode: ExcludeMode) -> Self {
        self.exclude_mode = mode;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ElementView<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_filter_mode(mut self, mode: ExcludeMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn with_placeholders(mut self, placeholders: bool) -> Self {
        self.placeholders = placeholders;
        self
    }

    pub fn with_proxy(mut self, template: impl Into<String>) -> Self {
        self.use_proxy = template.into();
        self
    }

    pub fn with_icon_font(mut self, family: impl Into<String>) -> Self {
        self.icon_fonts.push(family.into());
        self
    }

    pub fn with_local_font(mut self, font: LocalFont) -> Self {
        self.local_fonts.push(font);
        self
    }

    pub fn with_exclude_fonts(mut self, exclusions: FontExclusions) -> Self {
        self.exclude_fonts = Some(exclusions);
        self
    }

    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    pub fn with_outer_transforms(mut self, keep: bool) -> Self {
        self.outer_transforms = keep;
        self
    }

    pub fn with_outer_shadows(mut self, expand: bool) -> Self {
        self.outer_shadows = expand;
        self
    }

    pub fn with_fallback_url(mut self, fallback: FallbackUrl) -> Self {
        self.fallback_url = Some(fallback);
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    /// Quality clamped to the encoder range.
    pub fn clamped_quality(&self) -> f64 {
        self.quality.clamp(0.0, 1.0)
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaptureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureOptions")
            .field("fast", &self.fast)
            .field("scale", &self.scale)
            .field("dpr", &self.dpr)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("embed_fonts", &self.embed_fonts)
            .field("exclude", &self.exclude)
            .field("exclude_mode", &self.exclude_mode)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("filter_mode", &self.filter_mode)
            .field("placeholders", &self.placeholders)
            .field("use_proxy", &self.use_proxy)
            .field("cache", &self.cache)
            .field("outer_transforms", &self.outer_transforms)
            .field("outer_shadows", &self.outer_shadows)
            .field("fallback_url", &self.fallback_url)
            .field("quality", &self.quality)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[cfg(any(feature = "cli", feature = "wasm"))]
fn de_fallback_url<'de, D>(deserializer: D) -> Result<Option<FallbackUrl>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let url: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(url.map(FallbackUrl::Fixed))
}

// ============================================================================
// Pre-cache options
// ============================================================================

/// Options for [`crate::pre_cache`], which warms resource and font caches
/// without producing output.
#[derive(Debug, Clone)]
#[cfg_attr(
    any(feature = "cli", feature = "wasm"),
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct PreCacheOptions {
    pub embed_fonts: bool,
    pub use_proxy: String,
    pub icon_fonts: Vec<String>,
    pub local_fonts: Vec<LocalFont>,
    pub exclude_fonts: Option<FontExclusions>,
    pub cache: CachePolicy,
}

impl Default for PreCacheOptions {
    fn default() -> Self {
        Self {
            embed_fonts: true,
            use_proxy: String::new(),
            icon_fonts: Vec::new(),
            local_fonts: Vec::new(),
            exclude_fonts: None,
            cache: CachePolicy::Soft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CaptureOptions::new();
        assert!(opts.fast);
        assert_eq!(opts.scale, 1.0);
        assert_eq!(opts.dpr, 1.0);
        assert!(!opts.embed_fonts);
        assert!(opts.placeholders);
        assert_eq!(opts.exclude_mode, ExcludeMode::Hide);
        assert_eq!(opts.cache, CachePolicy::Soft);
        assert!(opts.outer_transforms);
        assert!(!opts.outer_shadows);
        assert_eq!(opts.quality, 0.92);
    }

    #[test]
    fn test_builder_chain() {
        let opts = CaptureOptions::new()
            .with_scale(2.0)
            .with_exclude(".ad")
            .with_exclude(".tracking")
            .with_exclude_mode(ExcludeMode::Remove)
            .with_filter(|el| el.tag() != "aside")
            .with_quality(0.5);
        assert_eq!(opts.scale, 2.0);
        assert_eq!(opts.exclude, vec![".ad", ".tracking"]);
        assert_eq!(opts.exclude_mode, ExcludeMode::Remove);
        assert!(opts.filter.is_some());
        assert_eq!(opts.quality, 0.5);
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(CaptureOptions::new().with_quality(1.7).clamped_quality(), 1.0);
        assert_eq!(CaptureOptions::new().with_quality(-0.2).clamped_quality(), 0.0);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("png".parse::<ExportFormat>().unwrap(), ExportFormat::Png);
        assert_eq!("JPEG".parse::<ExportFormat>().unwrap(), ExportFormat::Jpg);
        assert_eq!("webp".parse::<ExportFormat>().unwrap(), ExportFormat::Webp);
        assert!("tiff".parse::<ExportFormat>().is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_json_round_trip() {
        let json = r#"{
            "scale": 3.0,
            "embedFonts": true,
            "exclude": [".x"],
            "excludeMode": "remove",
            "useProxy": "https://proxy.example/?url=",
            "cache": "full",
            "fallbackUrl": "data:image/png;base64,AAAA",
            "format": "jpeg",
            "unknownKey": 42
        }"#;
        let opts: CaptureOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.scale, 3.0);
        assert!(opts.embed_fonts);
        assert_eq!(opts.exclude_mode, ExcludeMode::Remove);
        assert_eq!(opts.cache, CachePolicy::Full);
        assert_eq!(opts.format, ExportFormat::Jpg);
        assert!(matches!(
            opts.fallback_url,
            Some(FallbackUrl::Fixed(ref url)) if url.starts_with("data:image/png")
        ));
        // Missing keys keep defaults
        assert!(opts.fast);
        assert!(opts.placeholders);
    }
}
