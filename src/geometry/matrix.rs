//! 2D affine transform parsing and decomposition.
//!
//! Computed `transform` values arrive as function lists (`matrix(...)`,
//! `translate(...) scale(...)`, sometimes `matrix3d(...)`); the individual
//! `translate`/`rotate`/`scale` properties compose in front of them. The
//! capture only ever needs the flattened 2D matrix.

use crate::css::values::parse_px;
use crate::dom::node::StyleMap;

const EPSILON: f64 = 1e-6;

/// Column-major CSS affine matrix: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix2D {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix2D {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn rotation(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            ..Self::IDENTITY
        }
    }

    /// Skew by angle tangents along each axis.
    pub fn skewing(tan_x: f64, tan_y: f64) -> Self {
        Self {
            b: tan_y,
            c: tan_x,
            ..Self::IDENTITY
        }
    }

    pub fn is_identity(&self) -> bool {
        (self.a - 1.0).abs() < EPSILON
            && self.b.abs() < EPSILON
            && self.c.abs() < EPSILON
            && (self.d - 1.0).abs() < EPSILON
            && self.e.abs() < EPSILON
            && self.f.abs() < EPSILON
    }

    /// `self * other`; `other` applies to points first.
    pub fn multiply(&self, other: &Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Strip translation and rotation, keeping scale and shear.
    ///
    /// Gram-Schmidt on the linear columns: `M = R * Shear * Scale`; the
    /// returned matrix is `Shear * Scale`. A negative determinant folds the
    /// flip into the Y scale so mirroring survives.
    pub fn without_translate_rotate(&self) -> Self {
        let Self { a, b, c, d, .. } = *self;
        let det = a * d - b * c;
        let scale_x = a.hypot(b);
        if scale_x < EPSILON {
            return Self {
                a: 0.0,
                b: 0.0,
                c: 0.0,
                d: 0.0,
                e: 0.0,
                f: 0.0,
            };
        }
        let (nx, ny) = (a / scale_x, b / scale_x);
        let mut shear = nx * c + ny * d;
        let (rx, ry) = (c - nx * shear, d - ny * shear);
        let mut scale_y = rx.hypot(ry);
        if det < 0.0 {
            scale_y = -scale_y;
        }
        if scale_y.abs() > EPSILON {
            shear /= scale_y;
        }
        Self {
            a: scale_x,
            b: 0.0,
            c: shear * scale_y,
            d: scale_y,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Axis-aligned bounds of a `width x height` box mapped through this
    /// matrix around `(origin_x, origin_y)`.
    pub fn map_bounds(
        &self,
        width: f64,
        height: f64,
        origin_x: f64,
        origin_y: f64,
    ) -> (f64, f64, f64, f64) {
        let corners = [(0.0, 0.0), (width, 0.0), (0.0, height), (width, height)];
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for (x, y) in corners {
            let (px, py) = self.apply(x - origin_x, y - origin_y);
            let (px, py) = (px + origin_x, py + origin_y);
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
        (min_x, min_y, max_x, max_y)
    }

    /// Serialize as a `matrix(...)` value.
    pub fn to_css(&self) -> String {
        format!(
            "matrix({}, {}, {}, {}, {}, {})",
            fmt(self.a),
            fmt(self.b),
            fmt(self.c),
            fmt(self.d),
            fmt(self.e),
            fmt(self.f)
        )
    }
}

fn fmt(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a `transform` function list into a single matrix. Returns `None`
/// for `none`, empty, or values with no recognizable function.
pub fn parse_transform(value: &str) -> Option<Matrix2D> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return None;
    }

    let mut total = Matrix2D::IDENTITY;
    let mut any = false;
    let mut rest = value;
    while let Some(open) = rest.find('(') {
        let close = open + rest[open..].find(')')?;
        let name = rest[..open].trim().to_ascii_lowercase();
        let args: Vec<&str> = rest[open + 1..close].split(',').map(str::trim).collect();
        if let Some(m) = function_matrix(&name, &args) {
            total = total.multiply(&m);
            any = true;
        }
        rest = &rest[close + 1..];
    }

    any.then_some(total)
}

fn function_matrix(name: &str, args: &[&str]) -> Option<Matrix2D> {
    let num = |i: usize| -> Option<f64> { args.get(i)?.parse().ok() };
    let len = |i: usize| -> Option<f64> { args.get(i).and_then(|v| parse_px(v)) };
    let angle = |i: usize| -> Option<f64> { args.get(i).and_then(|v| parse_angle(v)) };

    match name {
        "matrix" if args.len() == 6 => Some(Matrix2D {
            a: num(0)?,
            b: num(1)?,
            c: num(2)?,
            d: num(3)?,
            e: num(4)?,
            f: num(5)?,
        }),
        // 2D slice of the 4x4 matrix.
        "matrix3d" if args.len() == 16 => Some(Matrix2D {
            a: num(0)?,
            b: num(1)?,
            c: num(4)?,
            d: num(5)?,
            e: num(12)?,
            f: num(13)?,
        }),
        "translate" | "translate3d" => Some(Matrix2D::translation(
            len(0).unwrap_or(0.0),
            len(1).unwrap_or(0.0),
        )),
        "translatex" => Some(Matrix2D::translation(len(0).unwrap_or(0.0), 0.0)),
        "translatey" => Some(Matrix2D::translation(0.0, len(0).unwrap_or(0.0))),
        "scale" | "scale3d" => {
            let sx = num(0)?;
            let sy = num(1).unwrap_or(sx);
            Some(Matrix2D::scaling(sx, sy))
        }
        "scalex" => Some(Matrix2D::scaling(num(0)?, 1.0)),
        "scaley" => Some(Matrix2D::scaling(1.0, num(0)?)),
        "rotate" | "rotatez" => Some(Matrix2D::rotation(angle(0)?)),
        "skew" => Some(Matrix2D::skewing(
            angle(0).unwrap_or(0.0).tan(),
            angle(1).unwrap_or(0.0).tan(),
        )),
        "skewx" => Some(Matrix2D::skewing(angle(0)?.tan(), 0.0)),
        "skewy" => Some(Matrix2D::skewing(0.0, angle(0)?.tan())),
        // rotate3d/perspective and friends have no faithful 2D reduction.
        _ => None,
    }
}

/// Parse a CSS angle into radians. Bare numbers pass through as radians
/// (only `0` appears unitless in practice).
fn parse_angle(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(deg) = value.strip_suffix("deg") {
        return deg.trim().parse::<f64>().ok().map(f64::to_radians);
    }
    if let Some(grad) = value.strip_suffix("grad") {
        return grad
            .trim()
            .parse::<f64>()
            .ok()
            .map(|g| g * std::f64::consts::PI / 200.0);
    }
    if let Some(rad) = value.strip_suffix("rad") {
        return rad.trim().parse().ok();
    }
    if let Some(turn) = value.strip_suffix("turn") {
        return turn
            .trim()
            .parse::<f64>()
            .ok()
            .map(|t| t * std::f64::consts::TAU);
    }
    value.parse().ok()
}

// ============================================================================
// Composition with individual transform properties
// ============================================================================

/// Flatten `translate`/`rotate`/`scale` and the `transform` list into one
/// matrix, in the order the cascade applies them.
pub(crate) fn composed_transform(map: &StyleMap) -> Matrix2D {
    let mut total = Matrix2D::IDENTITY;

    if let Some(value) = map.get("translate")
        && !value.eq_ignore_ascii_case("none")
    {
        let mut parts = value.split_whitespace();
        let tx = parts.next().and_then(parse_px).unwrap_or(0.0);
        let ty = parts.next().and_then(parse_px).unwrap_or(0.0);
        total = total.multiply(&Matrix2D::translation(tx, ty));
    }

    if let Some(value) = map.get("rotate")
        && !value.eq_ignore_ascii_case("none")
    {
        // 3D forms carry an axis prefix; the angle is the last token.
        if let Some(radians) = value.split_whitespace().last().and_then(parse_angle) {
            total = total.multiply(&Matrix2D::rotation(radians));
        }
    }

    if let Some(value) = map.get("scale")
        && !value.eq_ignore_ascii_case("none")
    {
        let mut parts = value.split_whitespace();
        if let Some(sx) = parts.next().and_then(|v| v.parse::<f64>().ok()) {
            let sy = parts
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(sx);
            total = total.multiply(&Matrix2D::scaling(sx, sy));
        }
    }

    if let Some(value) = map.get("transform")
        && let Some(m) = parse_transform(value)
    {
        total = total.multiply(&m);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_parse_matrix() {
        let m = parse_transform("matrix(1, 2, 3, 4, 5, 6)").unwrap();
        assert_eq!(m.a, 1.0);
        assert_eq!(m.b, 2.0);
        assert_eq!(m.c, 3.0);
        assert_eq!(m.d, 4.0);
        assert_eq!(m.e, 5.0);
        assert_eq!(m.f, 6.0);
    }

    #[test]
    fn test_parse_matrix3d_takes_2d_slice() {
        let m = parse_transform(
            "matrix3d(2, 0, 0, 0, 0, 3, 0, 0, 0, 0, 1, 0, 10, 20, 0, 1)",
        )
        .unwrap();
        assert_close(m.a, 2.0);
        assert_close(m.d, 3.0);
        assert_close(m.e, 10.0);
        assert_close(m.f, 20.0);
    }

    #[test]
    fn test_parse_list_composes_left_to_right() {
        let m = parse_transform("translate(10px, 0) scale(2)").unwrap();
        // Point (1, 0): scale first, then translate.
        let (x, y) = m.apply(1.0, 0.0);
        assert_close(x, 12.0);
        assert_close(y, 0.0);
    }

    #[test]
    fn test_parse_rotate_degrees() {
        let m = parse_transform("rotate(90deg)").unwrap();
        let (x, y) = m.apply(1.0, 0.0);
        assert_close(x, 0.0);
        assert_close(y, 1.0);
    }

    #[test]
    fn test_none_and_noise_yield_nothing() {
        assert!(parse_transform("none").is_none());
        assert!(parse_transform("").is_none());
        assert!(parse_transform("inherit").is_none());
    }

    #[test]
    fn test_unknown_function_is_skipped() {
        let m = parse_transform("perspective(500px) scale(2)").unwrap();
        assert_close(m.a, 2.0);
        assert_close(m.d, 2.0);
    }

    #[test]
    fn test_strip_rotation_keeps_scale() {
        let m = parse_transform("rotate(37deg) scale(2, 3)").unwrap();
        let reduced = m.without_translate_rotate();
        assert_close(reduced.a, 2.0);
        assert_close(reduced.b, 0.0);
        assert_close(reduced.c, 0.0);
        assert_close(reduced.d, 3.0);
    }

    #[test]
    fn test_strip_translation() {
        let m = parse_transform("translate(40px, 50px) scale(2)").unwrap();
        let reduced = m.without_translate_rotate();
        assert_close(reduced.e, 0.0);
        assert_close(reduced.f, 0.0);
        assert_close(reduced.a, 2.0);
    }

    #[test]
    fn test_strip_keeps_mirror_flip() {
        let m = parse_transform("scale(1, -1)").unwrap();
        let reduced = m.without_translate_rotate();
        assert_close(reduced.a, 1.0);
        assert_close(reduced.d, -1.0);
    }

    #[test]
    fn test_strip_keeps_shear() {
        let m = parse_transform("skewX(30deg)").unwrap();
        let reduced = m.without_translate_rotate();
        let tan30 = 30f64.to_radians().tan();
        assert_close(reduced.c, tan30);
        assert_close(reduced.a, 1.0);
        assert_close(reduced.d, 1.0);
    }

    #[test]
    fn test_map_bounds_with_center_origin() {
        // 100x50 box scaled 2x around its center grows symmetrically.
        let m = Matrix2D::scaling(2.0, 2.0);
        let (min_x, min_y, max_x, max_y) = m.map_bounds(100.0, 50.0, 50.0, 25.0);
        assert_close(min_x, -50.0);
        assert_close(min_y, -25.0);
        assert_close(max_x, 150.0);
        assert_close(max_y, 75.0);
    }

    #[test]
    fn test_composed_individual_properties() {
        let mut map = StyleMap::new();
        map.insert("translate".to_string(), "10px 20px".to_string());
        map.insert("scale".to_string(), "2".to_string());
        let m = composed_transform(&map);
        let (x, y) = m.apply(1.0, 1.0);
        assert_close(x, 12.0);
        assert_close(y, 22.0);
    }

    #[test]
    fn test_composed_identity_without_properties() {
        let map = StyleMap::new();
        assert!(composed_transform(&map).is_identity());
    }

    #[test]
    fn test_to_css_round_trip() {
        let m = Matrix2D {
            a: 2.0,
            b: 0.0,
            c: 0.5,
            d: 3.0,
            e: 0.0,
            f: 0.0,
        };
        assert_eq!(m.to_css(), "matrix(2, 0, 0.5, 3, 0, 0)");
        let back = parse_transform(&m.to_css()).unwrap();
        assert_eq!(back, m);
    }
}
