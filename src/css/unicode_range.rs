//! `unicode-range` parsing and subset classification.
//!
//! Font faces declare the codepoints they cover. Faces whose ranges never
//! intersect the captured text are dropped, and well-known subset shapes
//! ("latin", "cyrillic", ...) can be excluded by name.

use std::collections::BTreeSet;

/// An inclusive codepoint range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeRange {
    pub start: u32,
    pub end: u32,
}

impl UnicodeRange {
    pub fn contains(&self, cp: u32) -> bool {
        cp >= self.start && cp <= self.end
    }
}

/// Parse a `unicode-range` value such as `U+0-7F, U+131, U+4??`.
///
/// Malformed entries are skipped.
pub fn parse_ranges(value: &str) -> Vec<UnicodeRange> {
    value
        .split(',')
        .filter_map(|part| parse_range(part.trim()))
        .collect()
}

fn parse_range(part: &str) -> Option<UnicodeRange> {
    let rest = part
        .strip_prefix("U+")
        .or_else(|| part.strip_prefix("u+"))?;

    if let Some((lo, hi)) = rest.split_once('-') {
        let start = u32::from_str_radix(lo.trim(), 16).ok()?;
        let end = u32::from_str_radix(hi.trim(), 16).ok()?;
        if start > end || end > 0x10FFFF {
            return None;
        }
        return Some(UnicodeRange { start, end });
    }

    if rest.contains('?') {
        if rest.len() > 6 {
            return None;
        }
        let lo: String = rest.chars().map(|c| if c == '?' { '0' } else { c }).collect();
        let hi: String = rest.chars().map(|c| if c == '?' { 'F' } else { c }).collect();
        let start = u32::from_str_radix(&lo, 16).ok()?;
        let end = u32::from_str_radix(&hi, 16).ok()?;
        if end > 0x10FFFF {
            return None;
        }
        return Some(UnicodeRange { start, end });
    }

    let cp = u32::from_str_radix(rest.trim(), 16).ok()?;
    if cp > 0x10FFFF {
        return None;
    }
    Some(UnicodeRange { start: cp, end: cp })
}

/// Collect the set of codepoints used by a text sample.
pub fn collect_codepoints(text: &str, into: &mut BTreeSet<u32>) {
    for ch in text.chars() {
        into.insert(ch as u32);
    }
}

/// Whether any declared range covers any used codepoint.
pub fn ranges_intersect(ranges: &[UnicodeRange], used: &BTreeSet<u32>) -> bool {
    ranges
        .iter()
        .any(|r| used.range(r.start..=r.end).next().is_some())
}

// ============================================================================
// Subset classification
// ============================================================================

/// Canonical codepoint coverage for the named subsets that hosted font
/// services split faces into.
const SUBSETS: &[(&str, &[(u32, u32)])] = &[
    (
        "latin",
        &[
            (0x0000, 0x00FF),
            (0x0131, 0x0131),
            (0x0152, 0x0153),
            (0x02BB, 0x02BC),
            (0x02C6, 0x02C6),
            (0x02DA, 0x02DA),
            (0x02DC, 0x02DC),
            (0x0304, 0x0304),
            (0x0308, 0x0308),
            (0x0329, 0x0329),
            (0x2000, 0x206F),
            (0x20AC, 0x20AC),
            (0x2122, 0x2122),
            (0x2191, 0x2191),
            (0x2193, 0x2193),
            (0x2212, 0x2212),
            (0x2215, 0x2215),
            (0xFEFF, 0xFEFF),
            (0xFFFD, 0xFFFD),
        ],
    ),
    (
        "latin-ext",
        &[
            (0x0100, 0x02BA),
            (0x02BD, 0x02C5),
            (0x02C7, 0x02CC),
            (0x02CE, 0x02D7),
            (0x02DD, 0x02FF),
            (0x0304, 0x0304),
            (0x0308, 0x0308),
            (0x0329, 0x0329),
            (0x1D00, 0x1DBF),
            (0x1E00, 0x1E9F),
            (0x1EF2, 0x1EFF),
            (0x2020, 0x2020),
            (0x20A0, 0x20C0),
            (0x2113, 0x2113),
            (0x2C60, 0x2C7F),
            (0xA720, 0xA7FF),
        ],
    ),
    (
        "cyrillic",
        &[
            (0x0301, 0x0301),
            (0x0400, 0x045F),
            (0x0490, 0x0491),
            (0x04B0, 0x04B1),
            (0x2116, 0x2116),
        ],
    ),
    (
        "cyrillic-ext",
        &[
            (0x0460, 0x052F),
            (0x1C80, 0x1C8A),
            (0x20B4, 0x20B4),
            (0x2DE0, 0x2DFF),
            (0xA640, 0xA69F),
            (0xFE2E, 0xFE2F),
        ],
    ),
    (
        "greek",
        &[
            (0x0370, 0x0377),
            (0x037A, 0x037F),
            (0x0384, 0x038A),
            (0x038C, 0x038C),
            (0x038E, 0x03A1),
            (0x03A3, 0x03FF),
        ],
    ),
    ("greek-ext", &[(0x1F00, 0x1FFF)]),
    (
        "vietnamese",
        &[
            (0x0102, 0x0103),
            (0x0110, 0x0111),
            (0x0128, 0x0129),
            (0x0168, 0x0169),
            (0x01A0, 0x01A1),
            (0x01AF, 0x01B0),
            (0x0300, 0x0301),
            (0x0303, 0x0304),
            (0x0308, 0x0309),
            (0x0323, 0x0323),
            (0x0329, 0x0329),
            (0x1EA0, 0x1EF9),
            (0x20AB, 0x20AB),
        ],
    ),
];

/// Classify a face's declared ranges into subset tags.
///
/// A tag applies when every declared range lies inside the subset's
/// canonical coverage. Faces without a declared range get no tags.
pub fn subset_tags(ranges: &[UnicodeRange]) -> Vec<&'static str> {
    if ranges.is_empty() {
        return Vec::new();
    }
    SUBSETS
        .iter()
        .filter(|(_, coverage)| {
            ranges
                .iter()
                .all(|r| coverage.iter().any(|&(lo, hi)| r.start >= lo && r.end <= hi))
        })
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_codepoint() {
        let ranges = parse_ranges("U+26");
        assert_eq!(ranges, vec![UnicodeRange { start: 0x26, end: 0x26 }]);
    }

    #[test]
    fn test_parse_range_and_wildcard() {
        let ranges = parse_ranges("U+0-7F, U+4??");
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], UnicodeRange { start: 0, end: 0x7F });
        assert_eq!(ranges[1], UnicodeRange { start: 0x400, end: 0x4FF });
    }

    #[test]
    fn test_parse_skips_malformed() {
        let ranges = parse_ranges("U+XYZ, U+41, 42");
        assert_eq!(ranges, vec![UnicodeRange { start: 0x41, end: 0x41 }]);
    }

    #[test]
    fn test_ranges_intersect() {
        let ranges = parse_ranges("U+400-4FF");
        let mut used = BTreeSet::new();
        collect_codepoints("hello", &mut used);
        assert!(!ranges_intersect(&ranges, &used));
        collect_codepoints("привет", &mut used);
        assert!(ranges_intersect(&ranges, &used));
    }

    #[test]
    fn test_subset_tag_latin() {
        let ranges = parse_ranges(
            "U+0000-00FF, U+0131, U+0152-0153, U+2000-206F, U+20AC, U+FFFD",
        );
        let tags = subset_tags(&ranges);
        assert_eq!(tags, vec!["latin"]);
    }

    #[test]
    fn test_subset_tag_cyrillic() {
        let ranges = parse_ranges("U+0301, U+0400-045F, U+0490-0491, U+2116");
        assert_eq!(subset_tags(&ranges), vec!["cyrillic"]);
    }

    #[test]
    fn test_subset_tag_none_for_wide_face() {
        let ranges = parse_ranges("U+0-10FFFF");
        assert!(subset_tags(&ranges).is_empty());
    }

    #[test]
    fn test_no_range_means_no_tags() {
        assert!(subset_tags(&[]).is_empty());
    }
}
