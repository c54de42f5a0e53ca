//! Snapshot exports.
//!
//! A capture yields a [`Snapshot`]: the SVG data URL plus the retained
//! clone, frame, and style keys needed to rasterize without re-capturing.
//! SVG exports reuse the serialized text; raster exports paint the clone
//! through the CPU painter and encode with the `image` codecs.

mod painter;

use std::collections::HashMap;
use std::io::Cursor;

use image::RgbaImage;

use crate::css::values::parse_color;
use crate::dom::{Document, NodeId};
use crate::error::{Error, Result};
use crate::fetch::data_url;
use crate::geometry::Frame;
use crate::options::{CaptureOptions, ExportFormat};

/// Backdrop used when JPEG output has no configured background.
const DEFAULT_JPEG_BACKGROUND: [u8; 4] = [255, 255, 255, 255];

// ============================================================================
// Export artifacts
// ============================================================================

/// An image form of the capture: a data URL plus its dimensions.
///
/// `width`/`height` are natural pixels (the SVG attributes for vector form,
/// the backing store for raster form); `css_width`/`css_height` are the
/// display size after the scale option.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotImage {
    pub src: String,
    pub width: u32,
    pub height: u32,
    pub css_width: f64,
    pub css_height: f64,
}

/// A CPU canvas: RGBA backing store plus its CSS display size.
#[derive(Clone)]
pub struct Canvas {
    pub image: RgbaImage,
    pub css_width: f64,
    pub css_height: f64,
}

impl Canvas {
    /// Backing store width in device pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Backing store height in device pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("css_width", &self.css_width)
            .field("css_height", &self.css_height)
            .finish()
    }
}

/// Encoded export bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Per-export overrides. Unset fields fall back to the capture options.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub scale: Option<f64>,
    pub dpr: Option<f64>,
    pub quality: Option<f64>,
    pub background_color: Option<String>,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_dpr(mut self, dpr: f64) -> Self {
        self.dpr = Some(dpr);
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// The product of a capture.
#[derive(Debug)]
pub struct Snapshot {
    url: String,
    svg_text: String,
    frame: Frame,
    clone: Document,
    root: NodeId,
    style_map: HashMap<NodeId, String>,
    options: CaptureOptions,
}

impl Snapshot {
    pub(crate) fn new(
        url: String,
        svg_text: String,
        frame: Frame,
        clone: Document,
        root: NodeId,
        style_map: HashMap<NodeId, String>,
        options: CaptureOptions,
    ) -> Self {
        Self {
            url,
            svg_text,
            frame,
            clone,
            root,
            style_map,
            options,
        }
    }

    /// The `data:image/svg+xml` URL of the capture.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The decoded SVG document text.
    pub fn to_raw(&self) -> &str {
        &self.svg_text
    }

    /// Resolved capture geometry.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The capture as an SVG-backed image.
    pub fn to_img(&self) -> SnapshotImage {
        let scale = self.options.scale;
        SnapshotImage {
            src: self.url.clone(),
            width: self.frame.out_w.round().max(1.0) as u32,
            height: self.frame.out_h.round().max(1.0) as u32,
            css_width: self.frame.out_w * scale,
            css_height: self.frame.out_h * scale,
        }
    }

    /// Alias of [`Snapshot::to_img`]: the vector form of the capture.
    pub fn to_svg(&self) -> SnapshotImage {
        self.to_img()
    }

    /// Rasterize onto a canvas sized by the scale and dpr options: CSS size
    /// is the natural size times scale, the backing store is the CSS size
    /// times dpr, rounded up.
    pub fn to_canvas(&self) -> Canvas {
        self.to_canvas_with(&ExportOptions::default())
    }

    pub fn to_canvas_with(&self, overrides: &ExportOptions) -> Canvas {
        let (image, css_width, css_height) = self.rasterize(overrides);
        Canvas {
            image,
            css_width,
            css_height,
        }
    }

    /// Encode using the format from the capture options.
    pub fn to_blob(&self) -> Result<Blob> {
        self.to(self.options.format, &ExportOptions::default())
    }

    pub fn to_png(&self) -> Result<SnapshotImage> {
        self.raster_image(ExportFormat::Png, &ExportOptions::default())
    }

    pub fn to_jpg(&self) -> Result<SnapshotImage> {
        self.raster_image(ExportFormat::Jpg, &ExportOptions::default())
    }

    pub fn to_webp(&self) -> Result<SnapshotImage> {
        self.raster_image(ExportFormat::Webp, &ExportOptions::default())
    }

    /// Encode as `format`. SVG wraps the serialized text; raster formats
    /// paint the retained clone and encode the pixels.
    pub fn to(&self, format: ExportFormat, overrides: &ExportOptions) -> Result<Blob> {
        if format == ExportFormat::Svg {
            return Ok(Blob {
                mime: format.mime_type(),
                bytes: self.svg_text.clone().into_bytes(),
            });
        }
        let (image, _, _) = self.rasterize(overrides);
        let bytes = self.encode_raster(&image, format, overrides)?;
        Ok(Blob {
            mime: format.mime_type(),
            bytes,
        })
    }

    /// Write the export to disk. With a path, the format follows the file
    /// extension (falling back to the options); without one, the options'
    /// filename and format decide. Returns the path written.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn download(&self, path: Option<&std::path::Path>) -> Result<std::path::PathBuf> {
        let (format, target) = match path {
            Some(p) => {
                let format = match p.extension().and_then(|e| e.to_str()) {
                    Some(ext) => ext.parse()?,
                    None => self.options.format,
                };
                (format, p.to_path_buf())
            }
            None => {
                let format = self.options.format;
                let name = format!("{}.{}", self.options.filename, format.extension());
                (format, std::path::PathBuf::from(name))
            }
        };
        let blob = self.to(format, &ExportOptions::default())?;
        std::fs::write(&target, &blob.bytes)?;
        Ok(target)
    }

    // ------------------------------------------------------------------
    // Rasterization
    // ------------------------------------------------------------------

    fn rasterize(&self, overrides: &ExportOptions) -> (RgbaImage, f64, f64) {
        let scale = overrides.scale.unwrap_or(self.options.scale).max(0.0);
        let dpr = overrides.dpr.unwrap_or(self.options.dpr).max(0.0);
        let css_width = self.frame.out_w * scale;
        let css_height = self.frame.out_h * scale;
        let width = (css_width * dpr).ceil().max(1.0) as u32;
        let height = (css_height * dpr).ceil().max(1.0) as u32;
        let image = painter::paint(
            &self.clone,
            self.root,
            &self.frame,
            &self.style_map,
            width,
            height,
        );
        (image, css_width, css_height)
    }

    fn raster_image(&self, format: ExportFormat, overrides: &ExportOptions) -> Result<SnapshotImage> {
        let (image, css_width, css_height) = self.rasterize(overrides);
        let bytes = self.encode_raster(&image, format, overrides)?;
        Ok(SnapshotImage {
            src: data_url::encode(&bytes, format.mime_type()),
            width: image.width(),
            height: image.height(),
            css_width,
            css_height,
        })
    }

    fn encode_raster(
        &self,
        image: &RgbaImage,
        format: ExportFormat,
        overrides: &ExportOptions,
    ) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        match format {
            ExportFormat::Svg => {
                return Err(Error::UnsupportedFormat(
                    "svg is not a raster format".to_string(),
                ));
            }
            ExportFormat::Png => {
                image.write_to(&mut out, image::ImageFormat::Png)?;
            }
            ExportFormat::Jpg => {
                // JPEG has no alpha channel, so composite first
                let background = overrides
                    .background_color
                    .as_deref()
                    .or(self.options.background_color.as_deref())
                    .and_then(parse_color)
                    .unwrap_or(DEFAULT_JPEG_BACKGROUND);
                let rgb = composite_on(image, background);
                let quality = overrides
                    .quality
                    .unwrap_or(self.options.quality)
                    .clamp(0.0, 1.0);
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut out,
                    (quality * 100.0).round().clamp(1.0, 100.0) as u8,
                );
                rgb.write_with_encoder(encoder)?;
            }
            ExportFormat::Webp => {
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut out);
                image.write_with_encoder(encoder)?;
            }
        }
        Ok(out.into_inner())
    }
}

/// Flatten transparency onto a backdrop color.
fn composite_on(image: &RgbaImage, background: [u8; 4]) -> image::RgbImage {
    let mut out = image::RgbImage::new(image.width(), image.height());
    for (x, y, px) in image.enumerate_pixels() {
        let a = px.0[3] as f64 / 255.0;
        let blend = |s: u8, b: u8| -> u8 { (s as f64 * a + b as f64 * (1.0 - a)).round() as u8 };
        out.put_pixel(
            x,
            y,
            image::Rgb([
                blend(px.0[0], background[0]),
                blend(px.0[1], background[1]),
                blend(px.0[2], background[2]),
            ]),
        );
    }
    out
}
