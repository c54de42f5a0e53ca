//! CSS declaration parsing.
//!
//! Declarations are kept as raw `property: value` strings rather than typed
//! values: snapshots, class coining, and @font-face re-emission all need the
//! author's text back out, and the capture never interprets most properties.

use cssparser::{ParseError, Parser, ParserInput, RuleBodyParser};

use crate::dom::node::StyleMap;

/// A single parsed declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Property name, ascii-lowercased except for `--*` custom properties.
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: &str, value: &str) -> Self {
        Self {
            property: normalize_property(property),
            value: value.trim().to_string(),
        }
    }

    /// Whether this is a `--*` custom property.
    pub fn is_custom(&self) -> bool {
        self.property.starts_with("--")
    }
}

/// Lowercase standard property names; custom properties are case-sensitive.
pub fn normalize_property(name: &str) -> String {
    if name.starts_with("--") {
        name.to_string()
    } else {
        name.to_ascii_lowercase()
    }
}

/// Parse a freestanding declaration list (a `style` attribute body).
///
/// Returns `(normal, important)` declarations in source order. Invalid
/// declarations are skipped.
pub fn parse_declaration_list(text: &str) -> (Vec<Declaration>, Vec<Declaration>) {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut normal = Vec::new();
    let mut important = Vec::new();

    let mut decl_parser = DeclarationListParser {
        declarations: &mut normal,
        important_declarations: &mut important,
    };
    for result in RuleBodyParser::new(&mut parser, &mut decl_parser) {
        // Ignore errors - lenient parsing
        let _ = result;
    }

    (normal, important)
}

/// Declaration-list body parser shared by style rules, `@font-face` blocks,
/// and style attributes.
pub(crate) struct DeclarationListParser<'a> {
    pub declarations: &'a mut Vec<Declaration>,
    pub important_declarations: &'a mut Vec<Declaration>,
}

impl<'i> cssparser::AtRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        _name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_custom_error(()))
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        _start: &cssparser::ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        Err(input.new_custom_error(()))
    }
}

impl<'i> cssparser::QualifiedRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_custom_error(()))
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        _start: &cssparser::ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        Err(input.new_custom_error(()))
    }
}

impl<'i> cssparser::DeclarationParser<'i> for DeclarationListParser<'_> {
    type Declaration = ();
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &cssparser::ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        // Capture the raw value span; nested blocks are skipped automatically
        let start = input.position();
        while input.next().is_ok() {}
        let raw = input.slice_from(start);

        let (value, important) = split_important(raw);
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }

        let decl = Declaration::new(&name, value);
        if important {
            self.important_declarations.push(decl);
        } else {
            self.declarations.push(decl);
        }
        Ok(())
    }
}

impl<'i> cssparser::RuleBodyItemParser<'i, (), ()> for DeclarationListParser<'_> {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

/// Strip a trailing `!important` (with optional interior whitespace).
fn split_important(raw: &str) -> (&str, bool) {
    let trimmed = raw.trim_end();
    if trimmed.len() >= 9 && trimmed.is_char_boundary(trimmed.len() - 9) {
        let (head, tail) = trimmed.split_at(trimmed.len() - 9);
        if tail.eq_ignore_ascii_case("important") {
            let head = head.trim_end();
            if let Some(rest) = head.strip_suffix('!') {
                return (rest, true);
            }
        }
    }
    (raw, false)
}

// ============================================================================
// Shorthand expansion
// ============================================================================

/// Write a declaration into a style map, expanding common shorthands so that
/// default subtraction and snapshot keys operate on longhands.
pub fn apply_declaration(map: &mut StyleMap, property: &str, value: &str) {
    match property {
        "margin" => expand_box(map, "margin-", "", value),
        "padding" => expand_box(map, "padding-", "", value),
        "inset" => {
            let sides = box_values(value);
            map.insert("top".to_string(), sides[0].clone());
            map.insert("right".to_string(), sides[1].clone());
            map.insert("bottom".to_string(), sides[2].clone());
            map.insert("left".to_string(), sides[3].clone());
        }
        "border-width" => expand_box(map, "border-", "-width", value),
        "border-style" => expand_box(map, "border-", "-style", value),
        "border-color" => expand_box(map, "border-", "-color", value),
        "border" => expand_border(map, &["top", "right", "bottom", "left"], value),
        "border-top" => expand_border(map, &["top"], value),
        "border-right" => expand_border(map, &["right"], value),
        "border-bottom" => expand_border(map, &["bottom"], value),
        "border-left" => expand_border(map, &["left"], value),
        "outline" => expand_outline(map, value),
        "border-radius" => expand_radius(map, value),
        "overflow" => {
            let parts: Vec<&str> = value.split_whitespace().collect();
            let x = parts.first().copied().unwrap_or("visible");
            let y = parts.get(1).copied().unwrap_or(x);
            map.insert("overflow-x".to_string(), x.to_string());
            map.insert("overflow-y".to_string(), y.to_string());
        }
        "background" => expand_background(map, value),
        "font" => expand_font(map, value),
        _ => {
            map.insert(normalize_property(property), value.trim().to_string());
        }
    }
}

/// Split a 1-4 value box shorthand into [top, right, bottom, left].
fn box_values(value: &str) -> [String; 4] {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let get = |i: usize| -> &str {
        match parts.len() {
            0 => "0",
            1 => parts[0],
            2 => parts[i % 2],
            3 => {
                // top, right/left, bottom
                match i {
                    0 => parts[0],
                    1 | 3 => parts[1],
                    _ => parts[2],
                }
            }
            _ => parts[i],
        }
    };
    [
        get(0).to_string(),
        get(1).to_string(),
        get(2).to_string(),
        get(3).to_string(),
    ]
}

fn expand_box(map: &mut StyleMap, prefix: &str, suffix: &str, value: &str) {
    let sides = box_values(value);
    for (side, v) in ["top", "right", "bottom", "left"].iter().zip(sides) {
        map.insert(format!("{prefix}{side}{suffix}"), v);
    }
}

/// `border[-side]: <width> <style> <color>` in any order.
fn expand_border(map: &mut StyleMap, sides: &[&str], value: &str) {
    let mut width = "medium".to_string();
    let mut style = "none".to_string();
    let mut color = String::new();

    for token in split_top_level(value, ' ') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if is_border_style_keyword(token) {
            style = token.to_string();
        } else if token.chars().next().is_some_and(|c| c.is_ascii_digit())
            || matches!(token, "thin" | "medium" | "thick")
        {
            width = token.to_string();
        } else {
            color = token.to_string();
        }
    }

    for side in sides {
        map.insert(format!("border-{side}-width"), width.clone());
        map.insert(format!("border-{side}-style"), style.clone());
        if !color.is_empty() {
            map.insert(format!("border-{side}-color"), color.clone());
        }
    }
}

fn expand_outline(map: &mut StyleMap, value: &str) {
    let mut width = "medium".to_string();
    let mut style = "none".to_string();
    let mut color = String::new();

    for token in split_top_level(value, ' ') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if is_border_style_keyword(token) || token == "auto" {
            style = token.to_string();
        } else if token.chars().next().is_some_and(|c| c.is_ascii_digit())
            || matches!(token, "thin" | "medium" | "thick")
        {
            width = token.to_string();
        } else {
            color = token.to_string();
        }
    }

    map.insert("outline-width".to_string(), width);
    map.insert("outline-style".to_string(), style);
    if !color.is_empty() {
        map.insert("outline-color".to_string(), color);
    }
}

fn is_border_style_keyword(token: &str) -> bool {
    matches!(
        token,
        "none" | "hidden" | "dotted" | "dashed" | "solid" | "double" | "groove" | "ridge"
            | "inset" | "outset"
    )
}

fn expand_radius(map: &mut StyleMap, value: &str) {
    // Ignore the elliptical slash form; the first radii set is enough here
    let first = value.split('/').next().unwrap_or(value);
    let parts: Vec<&str> = first.split_whitespace().collect();
    let get = |i: usize| -> &str {
        match parts.len() {
            0 => "0",
            1 => parts[0],
            2 => parts[i % 2],
            3 => match i {
                0 => parts[0],
                1 | 3 => parts[1],
                _ => parts[2],
            },
            _ => parts[i],
        }
    };
    map.insert("border-top-left-radius".to_string(), get(0).to_string());
    map.insert("border-top-right-radius".to_string(), get(1).to_string());
    map.insert("border-bottom-right-radius".to_string(), get(2).to_string());
    map.insert("border-bottom-left-radius".to_string(), get(3).to_string());
}

/// Pull image layers and a trailing color out of a `background` shorthand.
/// Position/size/repeat components are dropped; the capture only consumes
/// `background-color` and `background-image`.
fn expand_background(map: &mut StyleMap, value: &str) {
    let mut images = Vec::new();
    let mut color = String::new();

    for layer in split_top_level(value, ',') {
        for token in split_top_level(layer.trim(), ' ') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if token.starts_with("url(") || token.contains("gradient(") {
                images.push(token.to_string());
            } else if looks_like_color(token) {
                color = token.to_string();
            }
        }
    }

    if !images.is_empty() {
        map.insert("background-image".to_string(), images.join(", "));
    }
    if !color.is_empty() {
        map.insert("background-color".to_string(), color.clone());
    }
    if images.is_empty() && color.is_empty() && value.trim() == "none" {
        map.insert("background-image".to_string(), "none".to_string());
    }
}

fn looks_like_color(token: &str) -> bool {
    token.starts_with('#')
        || token.starts_with("rgb(")
        || token.starts_with("rgba(")
        || token.starts_with("hsl(")
        || token.starts_with("hsla(")
        || token.starts_with("oklch(")
        || token.starts_with("color(")
        || matches!(
            token,
            "transparent" | "currentcolor" | "black" | "white" | "red" | "green" | "blue"
                | "gray" | "grey" | "yellow" | "orange" | "purple" | "pink" | "silver"
                | "maroon" | "navy" | "teal" | "aqua" | "fuchsia" | "lime" | "olive"
        )
}

/// `font: [style] [weight] size[/line-height] family`.
fn expand_font(map: &mut StyleMap, value: &str) {
    let tokens: Vec<String> = split_top_level(value, ' ')
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut size_idx = None;
    for (i, token) in tokens.iter().enumerate() {
        let head = token.split('/').next().unwrap_or(token);
        if head.chars().next().is_some_and(|c| c.is_ascii_digit())
            && head.chars().any(|c| c.is_ascii_alphabetic() || c == '%')
        {
            size_idx = Some(i);
            break;
        }
    }
    let Some(size_idx) = size_idx else {
        map.insert("font".to_string(), value.trim().to_string());
        return;
    };

    for token in &tokens[..size_idx] {
        match token.as_str() {
            "italic" | "oblique" => {
                map.insert("font-style".to_string(), token.clone());
            }
            "bold" | "bolder" | "lighter" => {
                map.insert("font-weight".to_string(), token.clone());
            }
            t if t.chars().all(|c| c.is_ascii_digit()) => {
                map.insert("font-weight".to_string(), token.clone());
            }
            "small-caps" => {
                map.insert("font-variant".to_string(), token.clone());
            }
            _ => {}
        }
    }

    let size_token = &tokens[size_idx];
    match size_token.split_once('/') {
        Some((size, lh)) => {
            map.insert("font-size".to_string(), size.to_string());
            map.insert("line-height".to_string(), lh.to_string());
        }
        None => {
            map.insert("font-size".to_string(), size_token.clone());
        }
    }

    if size_idx + 1 < tokens.len() {
        let family = tokens[size_idx + 1..].join(" ");
        map.insert("font-family".to_string(), family);
    }
}

/// Split on a separator at paren/bracket/quote nesting depth zero.
pub fn split_top_level(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                _ if c == sep && depth == 0 => {
                    parts.push(&value[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration_list() {
        let (normal, important) = parse_declaration_list("color: red; margin: 0 !important");
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].property, "color");
        assert_eq!(normal[0].value, "red");
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].property, "margin");
        assert_eq!(important[0].value, "0");
    }

    #[test]
    fn test_important_with_spaces() {
        let (normal, important) = parse_declaration_list("color: blue !  important");
        assert!(normal.is_empty());
        assert_eq!(important[0].value, "blue");
    }

    #[test]
    fn test_custom_property_case_preserved() {
        let (normal, _) = parse_declaration_list("--MainColor: teal; COLOR: teal");
        assert_eq!(normal[0].property, "--MainColor");
        assert_eq!(normal[1].property, "color");
    }

    #[test]
    fn test_nested_function_value() {
        let (normal, _) =
            parse_declaration_list("background-image: linear-gradient(to right, rgb(0, 0, 0), red)");
        assert_eq!(normal.len(), 1);
        assert_eq!(
            normal[0].value,
            "linear-gradient(to right, rgb(0, 0, 0), red)"
        );
    }

    #[test]
    fn test_margin_shorthand() {
        let mut map = StyleMap::new();
        apply_declaration(&mut map, "margin", "1px 2px");
        assert_eq!(map.get("margin-top").unwrap(), "1px");
        assert_eq!(map.get("margin-right").unwrap(), "2px");
        assert_eq!(map.get("margin-bottom").unwrap(), "1px");
        assert_eq!(map.get("margin-left").unwrap(), "2px");
    }

    #[test]
    fn test_border_shorthand() {
        let mut map = StyleMap::new();
        apply_declaration(&mut map, "border", "2px solid rgb(255, 0, 0)");
        assert_eq!(map.get("border-top-width").unwrap(), "2px");
        assert_eq!(map.get("border-left-style").unwrap(), "solid");
        assert_eq!(map.get("border-bottom-color").unwrap(), "rgb(255, 0, 0)");
    }

    #[test]
    fn test_background_shorthand() {
        let mut map = StyleMap::new();
        apply_declaration(&mut map, "background", "#fff url(a.png) no-repeat");
        assert_eq!(map.get("background-color").unwrap(), "#fff");
        assert_eq!(map.get("background-image").unwrap(), "url(a.png)");
    }

    #[test]
    fn test_font_shorthand() {
        let mut map = StyleMap::new();
        apply_declaration(&mut map, "font", "italic bold 12px/1.5 Arial, sans-serif");
        assert_eq!(map.get("font-style").unwrap(), "italic");
        assert_eq!(map.get("font-weight").unwrap(), "bold");
        assert_eq!(map.get("font-size").unwrap(), "12px");
        assert_eq!(map.get("line-height").unwrap(), "1.5");
        assert_eq!(map.get("font-family").unwrap(), "Arial, sans-serif");
    }

    #[test]
    fn test_split_top_level_respects_parens() {
        let parts = split_top_level("url(a,b), linear-gradient(red, blue), none", ',');
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].trim(), "url(a,b)");
        assert_eq!(parts[1].trim(), "linear-gradient(red, blue)");
        assert_eq!(parts[2].trim(), "none");
    }

    proptest::proptest! {
        #[test]
        fn prop_split_top_level_reassembles(value in "[a-z(),'\" ]{0,40}") {
            let parts = split_top_level(&value, ',');
            // Splitting never loses characters other than the separators
            let total: usize = parts.iter().map(|p| p.len()).sum();
            let seps = parts.len() - 1;
            proptest::prop_assert_eq!(total + seps, value.len());
        }
    }
}
