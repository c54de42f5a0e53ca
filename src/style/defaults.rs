//! User-agent default styles.
//!
//! These serve two roles: they seed the cascade the way a browser's UA
//! stylesheet would, and they form the baseline that element snapshots are
//! diffed against so default styling never reaches the output CSS.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Inherited properties seeded at the root of the cascade.
pub const ROOT_INHERITED: &[(&str, &str)] = &[
    ("color", "rgb(0, 0, 0)"),
    ("font-family", "serif"),
    ("font-size", "16px"),
    ("font-style", "normal"),
    ("font-weight", "400"),
    ("line-height", "normal"),
    ("text-align", "start"),
    ("visibility", "visible"),
    ("white-space", "normal"),
];

/// Per-tag UA declarations. Lengths in `em` resolve against the element's
/// own font size during the cascade, matching how browsers compute them.
const TAG_DEFAULTS: &[(&str, &[(&str, &str)])] = &[
    ("html", &[("display", "block")]),
    (
        "body",
        &[
            ("display", "block"),
            ("margin-top", "8px"),
            ("margin-right", "8px"),
            ("margin-bottom", "8px"),
            ("margin-left", "8px"),
        ],
    ),
    ("div", &[("display", "block")]),
    ("main", &[("display", "block")]),
    ("section", &[("display", "block")]),
    ("article", &[("display", "block")]),
    ("aside", &[("display", "block")]),
    ("header", &[("display", "block")]),
    ("footer", &[("display", "block")]),
    ("nav", &[("display", "block")]),
    ("figure", &[
        ("display", "block"),
        ("margin-top", "1em"),
        ("margin-bottom", "1em"),
        ("margin-left", "40px"),
        ("margin-right", "40px"),
    ]),
    ("figcaption", &[("display", "block")]),
    (
        "p",
        &[
            ("display", "block"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
        ],
    ),
    (
        "h1",
        &[
            ("display", "block"),
            ("font-size", "2em"),
            ("font-weight", "700"),
            ("margin-top", "0.67em"),
            ("margin-bottom", "0.67em"),
        ],
    ),
    (
        "h2",
        &[
            ("display", "block"),
            ("font-size", "1.5em"),
            ("font-weight", "700"),
            ("margin-top", "0.83em"),
            ("margin-bottom", "0.83em"),
        ],
    ),
    (
        "h3",
        &[
            ("display", "block"),
            ("font-size", "1.17em"),
            ("font-weight", "700"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
        ],
    ),
    (
        "h4",
        &[
            ("display", "block"),
            ("font-weight", "700"),
            ("margin-top", "1.33em"),
            ("margin-bottom", "1.33em"),
        ],
    ),
    (
        "h5",
        &[
            ("display", "block"),
            ("font-size", "0.83em"),
            ("font-weight", "700"),
            ("margin-top", "1.67em"),
            ("margin-bottom", "1.67em"),
        ],
    ),
    (
        "h6",
        &[
            ("display", "block"),
            ("font-size", "0.67em"),
            ("font-weight", "700"),
            ("margin-top", "2.33em"),
            ("margin-bottom", "2.33em"),
        ],
    ),
    (
        "ul",
        &[
            ("display", "block"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
            ("padding-left", "40px"),
            ("list-style-type", "disc"),
        ],
    ),
    (
        "ol",
        &[
            ("display", "block"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
            ("padding-left", "40px"),
            ("list-style-type", "decimal"),
        ],
    ),
    ("li", &[("display", "list-item")]),
    (
        "blockquote",
        &[
            ("display", "block"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
            ("margin-left", "40px"),
            ("margin-right", "40px"),
        ],
    ),
    (
        "pre",
        &[
            ("display", "block"),
            ("font-family", "monospace"),
            ("white-space", "pre"),
            ("margin-top", "1em"),
            ("margin-bottom", "1em"),
        ],
    ),
    ("code", &[("font-family", "monospace")]),
    ("kbd", &[("font-family", "monospace")]),
    ("samp", &[("font-family", "monospace")]),
    (
        "a",
        &[
            ("color", "rgb(0, 0, 238)"),
            ("text-decoration-line", "underline"),
            ("cursor", "pointer"),
        ],
    ),
    ("b", &[("font-weight", "700")]),
    ("strong", &[("font-weight", "700")]),
    ("i", &[("font-style", "italic")]),
    ("em", &[("font-style", "italic")]),
    ("u", &[("text-decoration-line", "underline")]),
    ("s", &[("text-decoration-line", "line-through")]),
    ("small", &[("font-size", "0.83em")]),
    ("sub", &[("font-size", "0.83em"), ("vertical-align", "sub")]),
    ("sup", &[("font-size", "0.83em"), ("vertical-align", "super")]),
    ("mark", &[("background-color", "rgb(255, 255, 0)")]),
    (
        "table",
        &[
            ("display", "table"),
            ("border-collapse", "separate"),
            ("border-spacing", "2px"),
        ],
    ),
    ("thead", &[("display", "table-header-group")]),
    ("tbody", &[("display", "table-row-group")]),
    ("tfoot", &[("display", "table-footer-group")]),
    ("tr", &[("display", "table-row")]),
    (
        "td",
        &[
            ("display", "table-cell"),
            ("padding-top", "1px"),
            ("padding-right", "1px"),
            ("padding-bottom", "1px"),
            ("padding-left", "1px"),
        ],
    ),
    (
        "th",
        &[
            ("display", "table-cell"),
            ("font-weight", "700"),
            ("text-align", "center"),
            ("padding-top", "1px"),
            ("padding-right", "1px"),
            ("padding-bottom", "1px"),
            ("padding-left", "1px"),
        ],
    ),
    ("caption", &[("display", "table-caption"), ("text-align", "center")]),
    (
        "hr",
        &[
            ("display", "block"),
            ("margin-top", "0.5em"),
            ("margin-bottom", "0.5em"),
            ("border-top-width", "1px"),
            ("border-right-width", "1px"),
            ("border-bottom-width", "1px"),
            ("border-left-width", "1px"),
            ("border-top-style", "inset"),
            ("border-right-style", "inset"),
            ("border-bottom-style", "inset"),
            ("border-left-style", "inset"),
        ],
    ),
    (
        "button",
        &[
            ("display", "inline-block"),
            ("text-align", "center"),
            ("cursor", "default"),
            ("background-color", "rgb(239, 239, 239)"),
            ("padding-top", "1px"),
            ("padding-right", "6px"),
            ("padding-bottom", "1px"),
            ("padding-left", "6px"),
            ("border-top-width", "2px"),
            ("border-right-width", "2px"),
            ("border-bottom-width", "2px"),
            ("border-left-width", "2px"),
            ("border-top-style", "outset"),
            ("border-right-style", "outset"),
            ("border-bottom-style", "outset"),
            ("border-left-style", "outset"),
        ],
    ),
    (
        "input",
        &[
            ("display", "inline-block"),
            ("padding-top", "1px"),
            ("padding-right", "2px"),
            ("padding-bottom", "1px"),
            ("padding-left", "2px"),
            ("border-top-width", "2px"),
            ("border-right-width", "2px"),
            ("border-bottom-width", "2px"),
            ("border-left-width", "2px"),
            ("border-top-style", "inset"),
            ("border-right-style", "inset"),
            ("border-bottom-style", "inset"),
            ("border-left-style", "inset"),
        ],
    ),
    (
        "textarea",
        &[
            ("display", "inline-block"),
            ("font-family", "monospace"),
            ("padding-top", "2px"),
            ("padding-right", "2px"),
            ("padding-bottom", "2px"),
            ("padding-left", "2px"),
            ("border-top-width", "1px"),
            ("border-right-width", "1px"),
            ("border-bottom-width", "1px"),
            ("border-left-width", "1px"),
            ("border-top-style", "solid"),
            ("border-right-style", "solid"),
            ("border-bottom-style", "solid"),
            ("border-left-style", "solid"),
        ],
    ),
    ("select", &[("display", "inline-block")]),
    ("label", &[("cursor", "default")]),
    ("img", &[("display", "inline")]),
    ("canvas", &[("display", "inline")]),
    ("video", &[("display", "inline")]),
    ("audio", &[("display", "none")]),
    (
        "iframe",
        &[
            ("display", "inline"),
            ("border-top-width", "2px"),
            ("border-right-width", "2px"),
            ("border-bottom-width", "2px"),
            ("border-left-width", "2px"),
            ("border-top-style", "inset"),
            ("border-right-style", "inset"),
            ("border-bottom-style", "inset"),
            ("border-left-style", "inset"),
        ],
    ),
    (
        "fieldset",
        &[
            ("display", "block"),
            ("margin-left", "2px"),
            ("margin-right", "2px"),
            ("padding-top", "0.35em"),
            ("padding-right", "0.75em"),
            ("padding-bottom", "0.625em"),
            ("padding-left", "0.75em"),
            ("border-top-width", "2px"),
            ("border-right-width", "2px"),
            ("border-bottom-width", "2px"),
            ("border-left-width", "2px"),
            ("border-top-style", "groove"),
            ("border-right-style", "groove"),
            ("border-bottom-style", "groove"),
            ("border-left-style", "groove"),
        ],
    ),
    ("legend", &[("display", "block")]),
    ("dl", &[("display", "block"), ("margin-top", "1em"), ("margin-bottom", "1em")]),
    ("dt", &[("display", "block")]),
    ("dd", &[("display", "block"), ("margin-left", "40px")]),
    ("form", &[("display", "block")]),
    ("address", &[("display", "block"), ("font-style", "italic")]),
    ("summary", &[("display", "list-item")]),
    ("details", &[("display", "block")]),
    ("head", &[("display", "none")]),
    ("title", &[("display", "none")]),
    ("meta", &[("display", "none")]),
    ("link", &[("display", "none")]),
    ("style", &[("display", "none")]),
    ("script", &[("display", "none")]),
    ("noscript", &[("display", "none")]),
    ("template", &[("display", "none")]),
    ("br", &[("display", "inline")]),
];

fn tag_table() -> &'static HashMap<&'static str, &'static [(&'static str, &'static str)]> {
    static TABLE: OnceLock<HashMap<&'static str, &'static [(&'static str, &'static str)]>> =
        OnceLock::new();
    TABLE.get_or_init(|| TAG_DEFAULTS.iter().copied().collect())
}

/// UA declarations for a tag. Unknown tags render inline, which matches how
/// browsers treat unrecognized elements.
pub fn ua_declarations(tag: &str) -> &'static [(&'static str, &'static str)] {
    static INLINE: [(&str, &str); 1] = [("display", "inline")];
    match tag_table().get(tag) {
        Some(decls) => decls,
        None => &INLINE,
    }
}

/// The computed style of an unstyled element of this tag: root inherited
/// values plus UA declarations, with `em` lengths resolved to pixels the way
/// the cascade resolves them. This is both the snapshot baseline and the
/// seed the document builder gives fresh elements.
pub fn baseline_style(tag: &str) -> crate::dom::node::StyleMap {
    use crate::css::values::parse_px;
    use crate::style::cascade::format_px;

    let mut map = crate::dom::node::StyleMap::new();
    for (prop, value) in ROOT_INHERITED {
        map.insert((*prop).to_string(), (*value).to_string());
    }
    for (prop, value) in ua_declarations(tag) {
        crate::css::declaration::apply_declaration(&mut map, prop, value);
    }
    if let Some(size) = map.get("font-size").cloned()
        && let Some(em) = size.strip_suffix("em").filter(|v| !v.ends_with('r'))
        && let Ok(factor) = em.trim().parse::<f64>()
    {
        map.insert("font-size".to_string(), format_px(factor * 16.0));
    }
    let font_size = map
        .get("font-size")
        .and_then(|v| parse_px(v))
        .unwrap_or(16.0);
    let ems: Vec<(String, f64)> = map
        .iter()
        .filter(|(prop, _)| *prop != "font-size")
        .filter_map(|(prop, value)| {
            value
                .strip_suffix("em")
                .filter(|v| !v.contains(' ') && !v.ends_with('r'))
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| (prop.clone(), v * font_size))
        })
        .collect();
    for (prop, px) in ems {
        map.insert(prop, format_px(px));
    }
    map
}

/// Whether a property inherits by default.
pub fn is_inherited(property: &str) -> bool {
    if property.starts_with("--") {
        return true;
    }
    matches!(
        property,
        "color"
            | "cursor"
            | "direction"
            | "font"
            | "font-family"
            | "font-size"
            | "font-stretch"
            | "font-style"
            | "font-variant"
            | "font-weight"
            | "letter-spacing"
            | "line-height"
            | "list-style"
            | "list-style-image"
            | "list-style-position"
            | "list-style-type"
            | "quotes"
            | "tab-size"
            | "text-align"
            | "text-indent"
            | "text-transform"
            | "text-shadow"
            | "visibility"
            | "white-space"
            | "word-break"
            | "word-spacing"
            | "overflow-wrap"
            | "hyphens"
            | "caption-side"
            | "border-collapse"
            | "border-spacing"
            | "empty-cells"
            | "-webkit-text-fill-color"
            | "-webkit-text-stroke-color"
    )
}

/// Initial values for properties not covered by the per-tag tables. Used
/// when deciding whether an authored value is just the default restated.
pub fn initial_value(property: &str) -> Option<&'static str> {
    let value = match property {
        "margin-top" | "margin-right" | "margin-bottom" | "margin-left" => "0px",
        "padding-top" | "padding-right" | "padding-bottom" | "padding-left" => "0px",
        "border-top-width" | "border-right-width" | "border-bottom-width"
        | "border-left-width" => "0px",
        "border-top-style" | "border-right-style" | "border-bottom-style"
        | "border-left-style" => "none",
        "border-top-left-radius" | "border-top-right-radius" | "border-bottom-right-radius"
        | "border-bottom-left-radius" => "0px",
        "outline-width" => "0px",
        "outline-style" => "none",
        "top" | "right" | "bottom" | "left" => "auto",
        "position" => "static",
        "float" => "none",
        "clear" => "none",
        "opacity" => "1",
        "overflow-x" | "overflow-y" => "visible",
        "z-index" => "auto",
        "width" | "height" => "auto",
        "min-width" | "min-height" => "auto",
        "max-width" | "max-height" => "none",
        "box-sizing" => "content-box",
        "background-color" => "rgba(0, 0, 0, 0)",
        "background-image" => "none",
        "background-repeat" => "repeat",
        "background-position" => "0% 0%",
        "background-size" => "auto",
        "background-attachment" => "scroll",
        "background-clip" => "border-box",
        "background-origin" => "padding-box",
        "flex-direction" => "row",
        "flex-wrap" => "nowrap",
        "flex-grow" => "0",
        "flex-shrink" => "1",
        "flex-basis" => "auto",
        "align-items" => "normal",
        "align-self" => "auto",
        "align-content" => "normal",
        "justify-content" => "normal",
        "justify-items" => "legacy",
        "justify-self" => "auto",
        "gap" | "row-gap" | "column-gap" => "normal",
        "order" => "0",
        "transform" => "none",
        "transform-origin" => "50% 50%",
        "box-shadow" => "none",
        "text-shadow" => "none",
        "filter" => "none",
        "backdrop-filter" => "none",
        "text-decoration-line" => "none",
        "text-decoration-style" => "solid",
        "text-indent" => "0px",
        "text-transform" => "none",
        "letter-spacing" => "normal",
        "word-spacing" => "normal",
        "vertical-align" => "baseline",
        "cursor" => "auto",
        "content" => "normal",
        "list-style-type" => "disc",
        "list-style-position" => "outside",
        "list-style-image" => "none",
        "object-fit" => "fill",
        "object-position" => "50% 50%",
        "pointer-events" => "auto",
        "user-select" => "auto",
        "direction" => "ltr",
        "word-break" => "normal",
        "overflow-wrap" => "normal",
        "border-collapse" => "separate",
        "table-layout" => "auto",
        "grid-template-columns" | "grid-template-rows" => "none",
        "grid-auto-flow" => "row",
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tag_defaults() {
        let h1 = ua_declarations("h1");
        assert!(h1.contains(&("font-weight", "700")));
        assert!(h1.contains(&("display", "block")));
    }

    #[test]
    fn test_unknown_tag_is_inline() {
        assert_eq!(ua_declarations("custom-widget"), &[("display", "inline")]);
    }

    #[test]
    fn test_inherited_properties() {
        assert!(is_inherited("color"));
        assert!(is_inherited("font-size"));
        assert!(is_inherited("--accent"));
        assert!(!is_inherited("margin-top"));
        assert!(!is_inherited("display"));
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(initial_value("margin-top"), Some("0px"));
        assert_eq!(initial_value("opacity"), Some("1"));
        assert_eq!(initial_value("nonexistent-prop"), None);
    }
}
