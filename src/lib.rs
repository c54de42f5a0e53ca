//! # snapdom
//!
//! Captures a DOM subtree as a self-contained SVG snapshot.
//!
//! A capture serializes the subtree to XHTML inside an SVG
//! `<foreignObject>`: computed styles are compressed into generated
//! classes, images and backgrounds become `data:` URLs, fonts embed on
//! demand, and shadow trees flatten in place. The result is a
//! [`Snapshot`] holding one SVG string (and its `data:` URL) that renders
//! the element without scripts, stylesheets, or network access, with
//! PNG/JPEG/WebP rasterization layered on top.
//!
//! ## Features
//!
//! - Full-fidelity clones: pseudo-elements, shadow DOM, canvas bitmaps,
//!   form state, scroll offsets, and nested iframes
//! - Self-contained output with graceful degradation when a resource
//!   cannot be fetched
//! - `@font-face` embedding with icon-font detection, local font
//!   registration, and family/domain/subset exclusions
//! - Exclusion of subtrees by selector or by callback
//! - Raster exports ([`Snapshot::to_png`], [`Snapshot::to_jpg`],
//!   [`Snapshot::to_webp`]) and file download on native targets
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapdom::{CaptureOptions, parse_html, snapdom};
//!
//! # async fn demo() -> snapdom::Result<()> {
//! let doc = parse_html("<div id=\"card\"><h1>Hello</h1></div>");
//! let target = doc.root_element().unwrap();
//!
//! let snapshot = snapdom(&doc, target, &CaptureOptions::default()).await?;
//! println!("{}", snapshot.url());
//! snapshot.download(None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Capture Options
//!
//! [`CaptureOptions`] configures a capture through a builder:
//!
//! ```
//! use snapdom::{CaptureOptions, ExcludeMode, ExportFormat};
//!
//! let options = CaptureOptions::new()
//!     .with_scale(2.0)
//!     .with_embed_fonts(true)
//!     .with_exclude(".toolbar")
//!     .with_exclude_mode(ExcludeMode::Remove)
//!     .with_format(ExportFormat::Png);
//! ```
//!
//! Documents come from [`parse_html`] (markup plus a coarse layout pass)
//! or from [`DocumentBuilder`] when the host has real measurements.

pub(crate) mod capture;
pub(crate) mod css;
pub mod dom;
pub mod error;
pub mod export;
pub mod fetch;
pub(crate) mod fonts;
pub mod geometry;
pub(crate) mod inline;
pub mod options;
pub mod runtime;
pub(crate) mod style;
pub(crate) mod svg;
pub(crate) mod util;

#[cfg(feature = "wasm")]
pub mod wasm;

use std::sync::{Arc, OnceLock};

pub use dom::{Document, DocumentBuilder, NodeId, parse_html, parse_html_with_css};
pub use error::{Error, Result};
pub use export::{Blob, Canvas, ExportOptions, Snapshot, SnapshotImage};
#[cfg(not(target_arch = "wasm32"))]
pub use fetch::HttpFetcher;
pub use fetch::{ResourceFetcher, StaticFetcher};
pub use geometry::Frame;
pub use options::{
    CachePolicy, CaptureOptions, ElementView, ExcludeMode, ExportFormat, FallbackUrl,
    FontExclusions, LocalFont, NodeFilter, PreCacheOptions,
};
pub use runtime::CaptureRuntime;

// ============================================================================
// Capture handle
// ============================================================================

/// Capture handle owning the runtime caches.
///
/// Captures made through one handle share fetched resources, inlined
/// images, font CSS, and style signatures. The free functions in this
/// module go through a process-wide handle instead.
pub struct SnapDom {
    runtime: CaptureRuntime,
}

impl SnapDom {
    /// Handle with the platform transport: HTTP on native targets, static
    /// data URLs on wasm.
    pub fn new() -> Self {
        Self {
            runtime: CaptureRuntime::default(),
        }
    }

    /// Handle fetching through a caller-supplied transport.
    pub fn with_transport(transport: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            runtime: CaptureRuntime::new(transport),
        }
    }

    /// The runtime backing this handle.
    pub fn runtime(&self) -> &CaptureRuntime {
        &self.runtime
    }

    /// Capture `target` and its subtree from `doc` as an SVG snapshot.
    ///
    /// `target` must be an element attached to `doc`; anything else is
    /// [`Error::InvalidInput`].
    pub async fn capture(
        &self,
        doc: &Document,
        target: NodeId,
        options: &CaptureOptions,
    ) -> Result<Snapshot> {
        capture::capture_node(&self.runtime, doc, target, options).await
    }

    /// Warm the image, background, and font caches for a later capture of
    /// `root` (the document root when `None`). Produces no output; fetch
    /// failures stay cold and are retried on capture.
    pub async fn pre_cache(&self, doc: &Document, root: Option<NodeId>, options: &PreCacheOptions) {
        pre_cache_with(&self.runtime, doc, root, options).await;
    }
}

impl Default for SnapDom {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_runtime() -> &'static CaptureRuntime {
    static RUNTIME: OnceLock<CaptureRuntime> = OnceLock::new();
    RUNTIME.get_or_init(CaptureRuntime::default)
}

// ============================================================================
// One-shot API
// ============================================================================

/// Capture `target` and its subtree through the process-wide runtime.
pub async fn snapdom(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<Snapshot> {
    capture::capture_node(shared_runtime(), doc, target, options).await
}

/// Warm the process-wide caches without producing output.
pub async fn pre_cache(doc: &Document, root: Option<NodeId>, options: &PreCacheOptions) {
    pre_cache_with(shared_runtime(), doc, root, options).await;
}

/// Capture and return the snapshot as an `<img>`-ready description of the
/// SVG data URL.
pub async fn snapdom_to_img(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<SnapshotImage> {
    Ok(snapdom(doc, target, options).await?.to_img())
}

/// Capture and return the SVG image description.
pub async fn snapdom_to_svg(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<SnapshotImage> {
    Ok(snapdom(doc, target, options).await?.to_svg())
}

/// Capture and rasterize onto an RGBA canvas.
pub async fn snapdom_to_canvas(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<Canvas> {
    Ok(snapdom(doc, target, options).await?.to_canvas())
}

/// Capture and encode in the options' format.
pub async fn snapdom_to_blob(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<Blob> {
    snapdom(doc, target, options).await?.to_blob()
}

/// Capture and encode as a PNG image.
pub async fn snapdom_to_png(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<SnapshotImage> {
    snapdom(doc, target, options).await?.to_png()
}

/// Capture and encode as a JPEG image.
pub async fn snapdom_to_jpg(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<SnapshotImage> {
    snapdom(doc, target, options).await?.to_jpg()
}

/// Capture and encode as a WebP image.
pub async fn snapdom_to_webp(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
) -> Result<SnapshotImage> {
    snapdom(doc, target, options).await?.to_webp()
}

/// Capture and write the export to disk. See [`Snapshot::download`].
#[cfg(not(target_arch = "wasm32"))]
pub async fn snapdom_download(
    doc: &Document,
    target: NodeId,
    options: &CaptureOptions,
    path: Option<&std::path::Path>,
) -> Result<std::path::PathBuf> {
    snapdom(doc, target, options).await?.download(path)
}

// ============================================================================
// Cache warming
// ============================================================================

async fn pre_cache_with(
    runtime: &CaptureRuntime,
    doc: &Document,
    root: Option<NodeId>,
    options: &PreCacheOptions,
) {
    runtime.apply_policy(options.cache);
    if let Some(base) = doc.base_url.as_deref() {
        runtime
            .fetch_manager()
            .set_page_origin(Some(fetch::origin_of(base)));
    }
    let Some(scan_root) = root.or_else(|| doc.root_element()) else {
        return;
    };
    inline::warm_resources(runtime, doc, scan_root, &options.use_proxy).await;

    let scan = fonts::scan_subtree(doc, scan_root);
    let families: Vec<String> = scan
        .required
        .iter()
        .map(|key| key.family.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    fonts::ensure_fonts_ready(runtime, doc, &families, 2).await;
    let config = fonts::FontEmbedConfig::from_pre_cache(options);
    fonts::embed_fonts(runtime, doc, &scan, &config).await;
}
