//! Utility functions with platform-specific implementations.

use std::borrow::Cow;

/// Get the current time in milliseconds since the Unix epoch.
///
/// On native platforms, uses `SystemTime::now()`.
/// On WASM, uses `js_sys::Date::now()`.
///
/// Drives error-TTL memoization and log-dedup windows; wall-clock jumps only
/// shorten or lengthen those windows, never break correctness.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> u64 {
    // js_sys::Date::now() returns milliseconds as f64
    js_sys::Date::now() as u64
}

/// Yield to the scheduler between capture phases.
///
/// With `fast` set this returns immediately, keeping the whole capture
/// synchronous. Otherwise it defers once: `tokio::task::yield_now` on native
/// targets, immediate on WASM (no idle scheduler is available there).
pub async fn idle(fast: bool) {
    if fast {
        return;
    }
    #[cfg(not(target_arch = "wasm32"))]
    tokio::task::yield_now().await;
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from an HTTP `charset=` parameter)
/// 3. Falls back to Windows-1252
///
/// # Arguments
///
/// * `bytes` - The raw bytes to decode
/// * `hint_encoding` - Optional encoding name from the transport's content type
///
/// # Returns
///
/// The decoded string. Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    // Try UTF-8 first (handles BOM automatically)
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    // If UTF-8 failed, try the hint encoding
    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    // Fallback: Windows-1252 (superset of ISO-8859-1)
    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

// ============================================================================
// URL Resolution
// ============================================================================

/// Resolve a possibly relative reference against a base URL. Scheme-carrying
/// references and references without a usable base pass through unchanged.
pub(crate) fn resolve_url(base: Option<&str>, reference: &str) -> String {
    let reference = reference.trim();
    if reference.starts_with("data:") || reference.starts_with("blob:") {
        return reference.to_string();
    }
    if let Some(base) = base
        && let Ok(base) = url::Url::parse(base)
        && let Ok(joined) = base.join(reference)
    {
        return joined.to_string();
    }
    reference.to_string()
}

// ============================================================================
// Image Encoding
// ============================================================================

/// Encode a tightly packed RGBA buffer as PNG bytes.
///
/// Canvas freezing and iframe rasterization both go through here; PNG keeps
/// the alpha channel the SVG compositor relies on.
pub(crate) fn encode_rgba_png(width: u32, height: u32, pixels: Vec<u8>) -> crate::error::Result<Vec<u8>> {
    let image = image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        crate::error::Error::InvalidInput(format!(
            "pixel buffer does not match {width}x{height} RGBA"
        ))
    })?;
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// PNG data URL for a fully transparent bitmap.
pub(crate) fn transparent_png_data_url(width: u32, height: u32) -> crate::error::Result<String> {
    let bytes = encode_rgba_png(width, height, vec![0u8; (width as usize) * (height as usize) * 4])?;
    Ok(crate::fetch::data_url::encode(&bytes, "image/png"))
}

// ============================================================================
// Percent Encoding
// ============================================================================

/// Percent-encoding set matching JavaScript's `encodeURIComponent`.
///
/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped. Used for
/// proxy URL carriers and the final SVG data URL payload.
pub const URI_COMPONENT: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a string with the [`URI_COMPONENT`] set.
pub fn encode_uri_component(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, URI_COMPONENT).to_string()
}

// ============================================================================
// Image Dimension Extraction
// ============================================================================

/// Extract image dimensions from raw image data.
///
/// Supports PNG, JPEG, and GIF formats by parsing header bytes. Used to fill
/// missing intrinsic sizes on inlined `<img>` elements without a full decode.
/// Returns `(width, height)` or `None` if format is unrecognized.
pub fn extract_image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 10 {
        return None;
    }

    // PNG: width/height at bytes 16-23 in IHDR chunk
    if data.len() >= 24 && data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47
    {
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Some((width, height));
    }

    // JPEG: Need to parse SOF markers
    if data[0] == 0xFF && data[1] == 0xD8 {
        return extract_jpeg_dimensions(data);
    }

    // GIF: width/height at bytes 6-9 (little-endian)
    if data[0] == 0x47 && data[1] == 0x49 && data[2] == 0x46 {
        let width = u16::from_le_bytes([data[6], data[7]]) as u32;
        let height = u16::from_le_bytes([data[8], data[9]]) as u32;
        return Some((width, height));
    }

    None
}

/// Extract dimensions from JPEG data by parsing SOF markers.
fn extract_jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 4 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }

        let marker = data[i + 1];

        // SOF markers (Start of Frame) - various encoding types
        if matches!(
            marker,
            0xC0 | 0xC1
                | 0xC2
                | 0xC3
                | 0xC5
                | 0xC6
                | 0xC7
                | 0xC9
                | 0xCA
                | 0xCB
                | 0xCD
                | 0xCE
                | 0xCF
        ) && i + 9 < data.len()
        {
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
            return Some((width, height));
        }

        // Skip to next marker
        if i + 3 < data.len() {
            let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            i += 2 + length;
        } else {
            break;
        }
    }
    None
}

// ============================================================================
// Resource Format Detection
// ============================================================================

/// Detected resource format.
///
/// Covers the media formats a capture touches: raster and vector images for
/// `<img>`/backgrounds, web font binaries for `@font-face` inlining.
/// Detection is done via file extension or magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
    /// SVG image (vector)
    Svg,
    /// WebP image
    WebP,
    /// TrueType font
    Ttf,
    /// OpenType font
    Otf,
    /// WOFF font
    Woff,
    /// WOFF2 font
    Woff2,
    /// Unknown/binary format
    Binary,
}

impl MediaFormat {
    /// Get the MIME type string for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Svg => "image/svg+xml",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Ttf => "font/ttf",
            MediaFormat::Otf => "font/otf",
            MediaFormat::Woff => "font/woff",
            MediaFormat::Woff2 => "font/woff2",
            MediaFormat::Binary => "application/octet-stream",
        }
    }

    /// Check if this format represents an image.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            MediaFormat::Jpeg
                | MediaFormat::Png
                | MediaFormat::Gif
                | MediaFormat::Svg
                | MediaFormat::WebP
        )
    }

    /// Check if this format represents a font.
    pub fn is_font(self) -> bool {
        matches!(
            self,
            MediaFormat::Ttf | MediaFormat::Otf | MediaFormat::Woff | MediaFormat::Woff2
        )
    }
}

/// Detect resource format from file path and/or raw bytes.
///
/// This is a pure function that encapsulates all format detection logic.
/// It tries extension-based detection first, then falls back to magic bytes.
///
/// # Arguments
///
/// * `path` - The resource path/href (used for extension detection)
/// * `data` - The raw resource bytes (used for magic byte detection)
///
/// # Returns
///
/// The detected `MediaFormat`, or `Binary` if unknown.
pub fn detect_media_format(path: &str, data: &[u8]) -> MediaFormat {
    // Try extension-based detection first (faster, most common case)
    let path_lower = strip_url_suffix(path).to_lowercase();

    if path_lower.ends_with(".jpg") || path_lower.ends_with(".jpeg") {
        return MediaFormat::Jpeg;
    }
    if path_lower.ends_with(".png") {
        return MediaFormat::Png;
    }
    if path_lower.ends_with(".gif") {
        return MediaFormat::Gif;
    }
    if path_lower.ends_with(".svg") {
        return MediaFormat::Svg;
    }
    if path_lower.ends_with(".webp") {
        return MediaFormat::WebP;
    }
    if path_lower.ends_with(".ttf") {
        return MediaFormat::Ttf;
    }
    if path_lower.ends_with(".otf") {
        return MediaFormat::Otf;
    }
    if path_lower.ends_with(".woff") {
        return MediaFormat::Woff;
    }
    if path_lower.ends_with(".woff2") {
        return MediaFormat::Woff2;
    }

    // Fallback to magic byte detection
    if data.len() >= 4 {
        // JPEG: FF D8 FF
        if data[0] == 0xFF && data[1] == 0xD8 {
            return MediaFormat::Jpeg;
        }
        // PNG: 89 50 4E 47 (.PNG)
        if data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47 {
            return MediaFormat::Png;
        }
        // GIF: 47 49 46 (GIF)
        if data[0] == 0x47 && data[1] == 0x49 && data[2] == 0x46 {
            return MediaFormat::Gif;
        }
        // WOFF: 77 4F 46 46 (wOFF), WOFF2: 77 4F 46 32 (wOF2)
        if data[0] == 0x77 && data[1] == 0x4F && data[2] == 0x46 {
            if data[3] == 0x46 {
                return MediaFormat::Woff;
            }
            if data[3] == 0x32 {
                return MediaFormat::Woff2;
            }
        }
        // TrueType: 00 01 00 00, OpenType: 4F 54 54 4F (OTTO)
        if data[0] == 0x00 && data[1] == 0x01 && data[2] == 0x00 && data[3] == 0x00 {
            return MediaFormat::Ttf;
        }
        if data[0] == 0x4F && data[1] == 0x54 && data[2] == 0x54 && data[3] == 0x4F {
            return MediaFormat::Otf;
        }
        // WebP: 52 49 46 46 ... 57 45 42 50 (RIFF...WEBP)
        if data.len() >= 12
            && data[0] == 0x52
            && data[1] == 0x49
            && data[2] == 0x46
            && data[3] == 0x46
            && data[8] == 0x57
            && data[9] == 0x45
            && data[10] == 0x42
            && data[11] == 0x50
        {
            return MediaFormat::WebP;
        }
        // Leading "<" strongly suggests inline SVG markup
        if data[0] == b'<' {
            return MediaFormat::Svg;
        }
    }

    MediaFormat::Binary
}

/// Detect MIME type from file extension or magic bytes.
///
/// Returns a static string like "image/jpeg", "font/woff2", etc.
/// Returns `None` if the format is unknown.
pub fn detect_mime_type(filename: &str, data: &[u8]) -> Option<&'static str> {
    let format = detect_media_format(filename, data);
    match format {
        MediaFormat::Binary => None,
        other => Some(other.mime_type()),
    }
}

/// Drop query string and fragment from a URL so extension checks see the path.
fn strip_url_suffix(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_media_format_by_extension() {
        assert_eq!(detect_media_format("image.jpg", &[]), MediaFormat::Jpeg);
        assert_eq!(detect_media_format("image.JPEG", &[]), MediaFormat::Jpeg);
        assert_eq!(detect_media_format("image.png", &[]), MediaFormat::Png);
        assert_eq!(detect_media_format("image.gif", &[]), MediaFormat::Gif);
        assert_eq!(detect_media_format("image.svg", &[]), MediaFormat::Svg);
        assert_eq!(detect_media_format("image.webp", &[]), MediaFormat::WebP);
        assert_eq!(detect_media_format("font.ttf", &[]), MediaFormat::Ttf);
        assert_eq!(detect_media_format("font.otf", &[]), MediaFormat::Otf);
        assert_eq!(detect_media_format("font.woff", &[]), MediaFormat::Woff);
        assert_eq!(detect_media_format("font.woff2", &[]), MediaFormat::Woff2);
        assert_eq!(detect_media_format("unknown", &[]), MediaFormat::Binary);
    }

    #[test]
    fn test_detect_media_format_ignores_query_string() {
        assert_eq!(
            detect_media_format("https://cdn.test/a.woff2?v=3", &[]),
            MediaFormat::Woff2
        );
        assert_eq!(
            detect_media_format("/img/pic.png#frag", &[]),
            MediaFormat::Png
        );
    }

    #[test]
    fn test_detect_media_format_by_magic_bytes() {
        // JPEG magic bytes
        let jpeg_data = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(
            detect_media_format("unknown", &jpeg_data),
            MediaFormat::Jpeg
        );

        // PNG magic bytes
        let png_data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_media_format("unknown", &png_data), MediaFormat::Png);

        // WOFF2 magic bytes
        let woff2_data = [0x77, 0x4F, 0x46, 0x32];
        assert_eq!(
            detect_media_format("unknown", &woff2_data),
            MediaFormat::Woff2
        );

        // GIF magic bytes
        let gif_data = [0x47, 0x49, 0x46, 0x38, 0x39, 0x61];
        assert_eq!(detect_media_format("unknown", &gif_data), MediaFormat::Gif);
    }

    #[test]
    fn test_media_format_mime_type() {
        assert_eq!(MediaFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(MediaFormat::Png.mime_type(), "image/png");
        assert_eq!(MediaFormat::Svg.mime_type(), "image/svg+xml");
        assert_eq!(MediaFormat::Woff2.mime_type(), "font/woff2");
        assert_eq!(MediaFormat::Binary.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_media_format_classification() {
        assert!(MediaFormat::Jpeg.is_image());
        assert!(MediaFormat::Png.is_image());
        assert!(!MediaFormat::Ttf.is_image());
        assert!(!MediaFormat::Binary.is_image());

        assert!(MediaFormat::Ttf.is_font());
        assert!(MediaFormat::Woff2.is_font());
        assert!(!MediaFormat::Jpeg.is_font());
    }

    #[test]
    fn test_extract_png_dimensions() {
        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0, 0, 0, 13]); // IHDR length
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&64u32.to_be_bytes());
        png.extend_from_slice(&48u32.to_be_bytes());
        assert_eq!(extract_image_dimensions(&png), Some((64, 48)));
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(
            encode_uri_component("https://a.test/x?y=1&z"),
            "https%3A%2F%2Fa.test%2Fx%3Fy%3D1%26z"
        );
        // encodeURIComponent leaves these unescaped
        assert_eq!(encode_uri_component("a-b_c.d!e~f*g'h(i)j"), "a-b_c.d!e~f*g'h(i)j");
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url(Some("https://a.test/page/"), "img/x.png"),
            "https://a.test/page/img/x.png"
        );
        assert_eq!(
            resolve_url(Some("https://a.test/page/"), "https://b.test/y.png"),
            "https://b.test/y.png"
        );
        assert_eq!(resolve_url(None, "img/x.png"), "img/x.png");
        assert_eq!(resolve_url(Some("https://a.test/"), "data:,x"), "data:,x");
    }

    #[test]
    fn test_encode_rgba_png_roundtrips_dimensions() {
        let bytes = encode_rgba_png(3, 2, vec![255u8; 3 * 2 * 4]).unwrap();
        assert_eq!(detect_media_format("", &bytes), MediaFormat::Png);
        assert_eq!(extract_image_dimensions(&bytes), Some((3, 2)));
    }

    #[test]
    fn test_encode_rgba_png_rejects_bad_buffer() {
        assert!(encode_rgba_png(3, 2, vec![0u8; 5]).is_err());
    }

    #[test]
    fn test_decode_text_utf8() {
        assert_eq!(decode_text("héllo".as_bytes(), None), "héllo");
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        // 0xE9 is é in Windows-1252 but malformed UTF-8
        assert_eq!(decode_text(&[0x68, 0xE9], None), "hé");
    }
}
