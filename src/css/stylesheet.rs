//! CSS stylesheet parsing.
//!
//! Parses author stylesheets into rules with raw declarations. Parsing is
//! lenient: invalid rules and unsupported at-rules are skipped, matching how
//! browsers recover from errors.

use cssparser::{ParseError, Parser, ParserInput, RuleBodyParser, StyleSheetParser};
use selectors::parser::{ParseRelative, Selector, SelectorList};

use crate::css::declaration::{Declaration, DeclarationListParser};
use crate::dom::element_ref::SnapSelectors;

/// A style rule: selectors plus declarations, split by importance.
#[derive(Debug, Clone)]
pub struct CssRule {
    pub selectors: Vec<Selector<SnapSelectors>>,
    pub declarations: Vec<Declaration>,
    pub important_declarations: Vec<Declaration>,
}

/// An `@font-face` rule with its declarations kept in source order, so the
/// font embedder can re-emit the block with a rewritten `src`.
#[derive(Debug, Clone, Default)]
pub struct FontFaceRule {
    pub declarations: Vec<Declaration>,
}

impl FontFaceRule {
    /// Last declaration wins, as in CSS.
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|d| d.property == property)
            .map(|d| d.value.as_str())
    }
}

/// A parsed stylesheet.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
    pub font_faces: Vec<FontFaceRule>,
    /// URLs referenced by `@import`, in source order.
    pub imports: Vec<String>,
}

impl Stylesheet {
    /// Parse a stylesheet, evaluating `@media` blocks against the viewport.
    pub fn parse(css: &str, viewport: (f64, f64)) -> Self {
        let mut sheet = Stylesheet::default();
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rule_parser = RuleParser {
            sheet: &mut sheet,
            viewport,
        };

        for result in StyleSheetParser::new(&mut parser, &mut rule_parser) {
            // Ignore errors - lenient parsing
            let _ = result;
        }

        sheet
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.font_faces.is_empty() && self.imports.is_empty()
    }
}

// ============================================================================
// Rule parsing
// ============================================================================

enum AtRulePrelude {
    FontFace,
    /// Media block, pre-evaluated against the viewport.
    Media(bool),
    Import(String),
}

struct RuleParser<'a> {
    sheet: &'a mut Stylesheet,
    viewport: (f64, f64),
}

impl<'i> cssparser::AtRuleParser<'i> for RuleParser<'_> {
    type Prelude = AtRulePrelude;
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        if name.eq_ignore_ascii_case("font-face") {
            return Ok(AtRulePrelude::FontFace);
        }
        if name.eq_ignore_ascii_case("media") {
            let start = input.position();
            while input.next().is_ok() {}
            let condition = input.slice_from(start).trim().to_string();
            return Ok(AtRulePrelude::Media(media_matches(&condition, self.viewport)));
        }
        if name.eq_ignore_ascii_case("import") {
            let url = input
                .expect_url_or_string()
                .map_err(|_| input.new_custom_error(()))?
                .as_ref()
                .to_string();
            // Trailing media list is ignored
            while input.next().is_ok() {}
            return Ok(AtRulePrelude::Import(url));
        }
        // @supports, @keyframes, @page and friends are skipped
        Err(input.new_custom_error(()))
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &cssparser::ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        match prelude {
            AtRulePrelude::FontFace => {
                let mut normal = Vec::new();
                let mut important = Vec::new();
                let mut decl_parser = DeclarationListParser {
                    declarations: &mut normal,
                    important_declarations: &mut important,
                };
                for result in RuleBodyParser::new(input, &mut decl_parser) {
                    let _ = result;
                }
                normal.extend(important);
                self.sheet
                    .font_faces
                    .push(FontFaceRule { declarations: normal });
                Ok(())
            }
            AtRulePrelude::Media(matches) => {
                if matches {
                    for result in RuleBodyParser::new(input, self) {
                        let _ = result;
                    }
                }
                // Non-matching blocks are left unconsumed and discarded
                Ok(())
            }
            AtRulePrelude::Import(_) => Err(input.new_custom_error(())),
        }
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &cssparser::ParserState,
    ) -> Result<Self::AtRule, Self::Error> {
        match prelude {
            AtRulePrelude::Import(url) => {
                self.sheet.imports.push(url);
                Ok(())
            }
            _ => Err(()),
        }
    }
}

impl<'i> cssparser::QualifiedRuleParser<'i> for RuleParser<'_> {
    type Prelude = Vec<Selector<SnapSelectors>>;
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let selectors = SelectorList::parse(&SnapSelectors, input, ParseRelative::No)
            .map_err(|_| input.new_custom_error(()))?;
        Ok(selectors.slice().to_vec())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &cssparser::ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let mut declarations = Vec::new();
        let mut important_declarations = Vec::new();
        let mut decl_parser = DeclarationListParser {
            declarations: &mut declarations,
            important_declarations: &mut important_declarations,
        };
        for result in RuleBodyParser::new(input, &mut decl_parser) {
            let _ = result;
        }

        if !declarations.is_empty() || !important_declarations.is_empty() {
            self.sheet.rules.push(CssRule {
                selectors: prelude,
                declarations,
                important_declarations,
            });
        }
        Ok(())
    }
}

impl<'i> cssparser::DeclarationParser<'i> for RuleParser<'_> {
    type Declaration = ();
    type Error = ();
}

impl<'i> cssparser::RuleBodyItemParser<'i, (), ()> for RuleParser<'_> {
    fn parse_declarations(&self) -> bool {
        false
    }
    fn parse_qualified(&self) -> bool {
        true
    }
}

// ============================================================================
// Specificity
// ============================================================================

/// Selector specificity as (ids, classes, elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Specificity {
    pub ids: u32,
    pub classes: u32,
    pub elements: u32,
}

impl Specificity {
    /// Unpack the bit-packed specificity stored by the selectors crate.
    pub fn from_selector(selector: &Selector<SnapSelectors>) -> Self {
        let packed = selector.specificity();
        Specificity {
            ids: (packed >> 20) & 0x3FF,
            classes: (packed >> 10) & 0x3FF,
            elements: packed & 0x3FF,
        }
    }
}

// ============================================================================
// Media query evaluation
// ============================================================================

/// Evaluate a media query list against the viewport.
///
/// Supports the common screen-capture cases: media types, `min-width`,
/// `max-width`, `and` chains, and leading `not`. Anything unrecognized is
/// treated as matching, which keeps parsing lenient.
fn media_matches(condition: &str, viewport: (f64, f64)) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }
    // Comma-separated queries: any match suffices
    crate::css::declaration::split_top_level(condition, ',')
        .iter()
        .any(|query| media_query_matches(query.trim(), viewport))
}

fn media_query_matches(query: &str, viewport: (f64, f64)) -> bool {
    let (negated, query) = match query.strip_prefix("not ") {
        Some(rest) => (true, rest.trim()),
        None => (false, query),
    };

    let mut result = true;
    for clause in query.split(" and ") {
        let clause = clause.trim();
        if !media_clause_matches(clause, viewport) {
            result = false;
            break;
        }
    }

    result != negated
}

fn media_clause_matches(clause: &str, viewport: (f64, f64)) -> bool {
    let clause = clause.trim_start_matches("only ").trim();
    match clause.to_ascii_lowercase().as_str() {
        "all" | "screen" => return true,
        "print" | "speech" => return false,
        _ => {}
    }

    let inner = clause.trim_start_matches('(').trim_end_matches(')');
    if let Some((feature, value)) = inner.split_once(':') {
        let feature = feature.trim().to_ascii_lowercase();
        let value = value.trim();
        match feature.as_str() {
            "min-width" => {
                return parse_media_px(value).is_none_or(|px| viewport.0 >= px);
            }
            "max-width" => {
                return parse_media_px(value).is_none_or(|px| viewport.0 <= px);
            }
            "min-height" => {
                return parse_media_px(value).is_none_or(|px| viewport.1 >= px);
            }
            "max-height" => {
                return parse_media_px(value).is_none_or(|px| viewport.1 <= px);
            }
            "orientation" => {
                let landscape = viewport.0 >= viewport.1;
                return match value.to_ascii_lowercase().as_str() {
                    "landscape" => landscape,
                    "portrait" => !landscape,
                    _ => true,
                };
            }
            _ => return true,
        }
    }
    true
}

fn parse_media_px(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse().ok();
    }
    if let Some(em) = value.strip_suffix("em") {
        return em.trim().parse::<f64>().ok().map(|v| v * 16.0);
    }
    value.parse().ok()
}
