//! Small value parsers shared across the capture pipeline.

/// Parse a CSS length into pixels.
///
/// Computed styles report absolute lengths in `px`; the other absolute units
/// and the common relative ones are converted with the usual 16px em base.
/// Percentages and keywords return `None`.
pub fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse().ok();
    }
    if let Some(pt) = value.strip_suffix("pt") {
        return pt.trim().parse::<f64>().ok().map(|v| v * 4.0 / 3.0);
    }
    if let Some(rem) = value.strip_suffix("rem") {
        return rem.trim().parse::<f64>().ok().map(|v| v * 16.0);
    }
    if let Some(em) = value.strip_suffix("em") {
        return em.trim().parse::<f64>().ok().map(|v| v * 16.0);
    }
    // Bare numbers appear in presentational attributes (width="300")
    value.parse().ok()
}

/// Parse a float out of the front of a value, ignoring a trailing unit.
pub fn parse_leading_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *i == 0)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    value[..end].parse().ok()
}

/// Parse a CSS color into premultiplication-free RGBA bytes.
///
/// Covers the forms computed styles and builder tests produce: hex,
/// `rgb()`/`rgba()` with comma or space syntax, `transparent`, and the
/// basic named colors. Gradients, `hsl()`, and system colors return `None`.
pub fn parse_color(value: &str) -> Option<[u8; 4]> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex_color(hex);
    }

    let lower = value.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_args(args);
    }

    named_color(&lower)
}

fn parse_hex_color(hex: &str) -> Option<[u8; 4]> {
    let digit = |c: u8| -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    };
    let b = hex.as_bytes();
    match b.len() {
        3 | 4 => {
            let mut out = [255u8; 4];
            for (i, &c) in b.iter().enumerate() {
                let d = digit(c)?;
                out[i] = d * 16 + d;
            }
            Some(out)
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for i in 0..b.len() / 2 {
                out[i] = digit(b[2 * i])? * 16 + digit(b[2 * i + 1])?;
            }
            Some(out)
        }
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<[u8; 4]> {
    let parts: Vec<&str> = if args.contains(',') {
        args.split(',').map(str::trim).collect()
    } else {
        // Space syntax, optionally `r g b / a`
        args.split([' ', '/'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    };
    if parts.len() < 3 {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        if let Some(pct) = s.strip_suffix('%') {
            let v: f64 = pct.trim().parse().ok()?;
            Some((v * 2.55).round().clamp(0.0, 255.0) as u8)
        } else {
            let v: f64 = s.parse().ok()?;
            Some(v.round().clamp(0.0, 255.0) as u8)
        }
    };
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = match parts.get(3) {
        Some(s) => {
            let v: f64 = if let Some(pct) = s.strip_suffix('%') {
                pct.trim().parse::<f64>().ok()? / 100.0
            } else {
                s.parse().ok()?
            };
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        None => 255,
    };
    Some([r, g, b, a])
}

fn named_color(name: &str) -> Option<[u8; 4]> {
    let rgb = match name {
        "transparent" => return Some([0, 0, 0, 0]),
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "cyan" | "aqua" => [0, 255, 255],
        "magenta" | "fuchsia" => [255, 0, 255],
        "gray" | "grey" => [128, 128, 128],
        "silver" => [192, 192, 192],
        "maroon" => [128, 0, 0],
        "olive" => [128, 128, 0],
        "lime" => [0, 255, 0],
        "teal" => [0, 128, 128],
        "navy" => [0, 0, 128],
        "purple" => [128, 0, 128],
        "orange" => [255, 165, 0],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 255])
}
