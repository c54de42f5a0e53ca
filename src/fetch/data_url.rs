//! `data:` URL encoding and decoding.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

// Browsers accept unpadded base64 payloads; decode indifferently.
const LENIENT: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    base64::engine::GeneralPurposeConfig::new()
        .with_decode_padding_mode(base64::engine::DecodePaddingMode::Indifferent),
);

pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Media type declared in a data URL header, if any.
pub fn mime_of(url: &str) -> Option<String> {
    let rest = url.strip_prefix("data:")?;
    let header = &rest[..rest.find(',')?];
    header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|s| s.contains('/'))
        .map(|s| s.to_string())
}

/// Decode a data URL into raw bytes plus its declared media type.
pub fn decode(url: &str) -> Result<(Vec<u8>, Option<String>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUrl("missing data: scheme".to_string()))?;
    let comma = rest
        .find(',')
        .ok_or_else(|| Error::InvalidDataUrl("missing comma separator".to_string()))?;
    let header = &rest[..comma];
    let payload = &rest[comma + 1..];

    let mime = header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|s| s.contains('/'))
        .map(|s| s.to_string());

    let is_base64 = header.split(';').any(|part| part.trim() == "base64");
    let bytes = if is_base64 {
        let cleaned: Vec<u8> = payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        LENIENT
            .decode(&cleaned)
            .map_err(|e| Error::InvalidDataUrl(format!("base64 payload: {e}")))?
    } else {
        percent_encoding::percent_decode_str(payload).collect()
    };

    Ok((bytes, mime))
}

/// Encode bytes as a base64 data URL with the given media type.
pub fn encode(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64() {
        let (bytes, mime) = decode("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_decode_unpadded_base64() {
        let (bytes, _) = decode("data:application/octet-stream;base64,aGVsbG8").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_percent_encoded() {
        let (bytes, mime) = decode("data:text/css;charset=utf-8,body%7Bcolor%3Ared%7D").unwrap();
        assert_eq!(bytes, b"body{color:red}");
        assert_eq!(mime.as_deref(), Some("text/css"));
    }

    #[test]
    fn test_decode_no_media_type() {
        let (bytes, mime) = decode("data:,hi").unwrap();
        assert_eq!(bytes, b"hi");
        assert_eq!(mime, None);
    }

    #[test]
    fn test_decode_missing_comma_is_error() {
        assert!(decode("data:image/png;base64").is_err());
        assert!(decode("https://example.com/a.png").is_err());
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(b"hello", "image/png"), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_mime_of() {
        assert_eq!(
            mime_of("data:image/svg+xml;charset=utf-8,<svg/>").as_deref(),
            Some("image/svg+xml")
        );
        assert_eq!(mime_of("data:;base64,AA=="), None);
        assert_eq!(mime_of("https://x.test/"), None);
    }
}
