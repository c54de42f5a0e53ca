//! CSS cascade implementation.
//!
//! Resolves which declarations apply to each element based on importance,
//! inline position, specificity, and source order, then writes the computed
//! style maps into the document arena.

use std::cmp::Ordering;

use selectors::context::{MatchingContext, SelectorCaches};

use crate::css::declaration::{self, Declaration};
use crate::css::stylesheet::{CssRule, Specificity, Stylesheet};
use crate::css::values::parse_px;
use crate::dom::arena::{Document, NodeId};
use crate::dom::element_ref::ElementRef;
use crate::dom::node::{PseudoKind, StyleMap};
use crate::style::defaults;

/// A matched declaration with ordering information for the cascade.
#[derive(Debug)]
struct MatchedRule<'a> {
    declaration: &'a Declaration,
    /// Declarations from the `style` attribute outrank any selector.
    inline: bool,
    specificity: Specificity,
    order: usize,
    important: bool,
}

/// Compute styles for every element in the document, including shadow trees.
///
/// Author stylesheets are parsed once, matched per element, and the computed
/// maps (plus pseudo-element maps) are written back into the arena.
pub fn compute_document_styles(doc: &mut Document) {
    let sheets: Vec<Stylesheet> = doc
        .stylesheets
        .iter()
        .filter_map(|s| s.text.as_deref())
        .map(|text| Stylesheet::parse(text, doc.viewport))
        .collect();

    let mut results = Vec::new();
    let mut shadow_hosts = Vec::new();

    if let Some(root) = doc.root_element() {
        cascade_subtree(doc, root, &sheets, None, &mut results, &mut shadow_hosts);
    }
    write_results(doc, results);

    // Shadow trees cascade against their own styles, inheriting through the
    // host. Hosts found inside shadow trees queue up behind their parents.
    let mut queue = shadow_hosts;
    while let Some(host) = queue.pop() {
        let Some(shadow) = doc.element(host).and_then(|el| el.shadow_root) else {
            continue;
        };
        let mut css = String::new();
        collect_style_text(doc, shadow, &mut css);
        let shadow_sheets = vec![Stylesheet::parse(&css, doc.viewport)];

        let host_map = doc.element(host).map(|el| el.computed.clone());
        let mut results = Vec::new();
        let mut nested = Vec::new();
        let mut child = doc.get(shadow).map_or(NodeId::NONE, |n| n.first_child);
        while child.is_some() {
            cascade_subtree(doc, child, &shadow_sheets, host_map.as_ref(), &mut results, &mut nested);
            child = doc.get(child).map_or(NodeId::NONE, |n| n.next_sibling);
        }
        write_results(doc, results);
        queue.extend(nested);
    }
}

type ElementStyles = (NodeId, StyleMap, Vec<(PseudoKind, StyleMap)>);

fn write_results(doc: &mut Document, results: Vec<ElementStyles>) {
    for (id, computed, pseudos) in results {
        if let Some(el) = doc.element_mut(id) {
            el.computed = computed;
            el.pseudos = pseudos;
        }
    }
}

/// Concatenate the text of `<style>` elements under a root.
fn collect_style_text(doc: &Document, root: NodeId, out: &mut String) {
    for id in doc.descendants(root) {
        if doc.element_name(id).is_some_and(|n| n.as_ref() == "style") {
            doc.collect_text(id, out);
            out.push('\n');
        }
    }
}

fn cascade_subtree(
    doc: &Document,
    id: NodeId,
    sheets: &[Stylesheet],
    parent: Option<&StyleMap>,
    results: &mut Vec<ElementStyles>,
    shadow_hosts: &mut Vec<NodeId>,
) {
    let Some(el) = doc.element(id) else {
        // Non-element containers pass the inherited map through
        let mut child = doc.get(id).map_or(NodeId::NONE, |n| n.first_child);
        while child.is_some() {
            cascade_subtree(doc, child, sheets, parent, results, shadow_hosts);
            child = doc.get(child).map_or(NodeId::NONE, |n| n.next_sibling);
        }
        return;
    };

    let computed = compute_element_style(doc, id, sheets, parent);
    let pseudos = compute_pseudo_styles(doc, id, sheets, &computed);

    if el.shadow_root.is_some() {
        shadow_hosts.push(id);
    }

    results.push((id, computed.clone(), pseudos));

    let mut child = doc.get(id).map_or(NodeId::NONE, |n| n.first_child);
    while child.is_some() {
        cascade_subtree(doc, child, sheets, Some(&computed), results, shadow_hosts);
        child = doc.get(child).map_or(NodeId::NONE, |n| n.next_sibling);
    }
}

/// Compute one element's style map.
pub fn compute_element_style(
    doc: &Document,
    id: NodeId,
    sheets: &[Stylesheet],
    parent: Option<&StyleMap>,
) -> StyleMap {
    let elem = ElementRef::new(doc, id);
    let mut map = StyleMap::new();

    // Inherited properties flow down; the root seeds browser defaults
    match parent {
        Some(parent) => {
            for (prop, value) in parent {
                if defaults::is_inherited(prop) {
                    map.insert(prop.clone(), value.clone());
                }
            }
        }
        None => {
            for (prop, value) in defaults::ROOT_INHERITED {
                map.insert((*prop).to_string(), (*value).to_string());
            }
        }
    }

    // UA declarations for the tag outrank inheritance
    if let Some(el) = doc.element(id) {
        for (prop, value) in defaults::ua_declarations(el.tag()) {
            declaration::apply_declaration(&mut map, prop, value);
        }
    }

    let inline_attr = doc.get_attr(id, "style").map(|s| s.to_string());
    let (inline_normal, inline_important) = match &inline_attr {
        Some(text) => declaration::parse_declaration_list(text),
        None => (Vec::new(), Vec::new()),
    };

    let mut matched: Vec<MatchedRule> = Vec::with_capacity(16);
    let mut order = 0;
    let mut caches = SelectorCaches::default();

    for sheet in sheets {
        for rule in &sheet.rules {
            if let Some(specificity) = rule_specificity_if_matches(&elem, rule, &mut caches) {
                for decl in &rule.declarations {
                    matched.push(MatchedRule {
                        declaration: decl,
                        inline: false,
                        specificity,
                        order,
                        important: false,
                    });
                    order += 1;
                }
                for decl in &rule.important_declarations {
                    matched.push(MatchedRule {
                        declaration: decl,
                        inline: false,
                        specificity,
                        order,
                        important: true,
                    });
                    order += 1;
                }
            }
        }
    }
    for decl in &inline_normal {
        matched.push(MatchedRule {
            declaration: decl,
            inline: true,
            specificity: Specificity::default(),
            order,
            important: false,
        });
        order += 1;
    }
    for decl in &inline_important {
        matched.push(MatchedRule {
            declaration: decl,
            inline: true,
            specificity: Specificity::default(),
            order,
            important: true,
        });
        order += 1;
    }

    sort_matched(&mut matched);
    for rule in &matched {
        declaration::apply_declaration(&mut map, &rule.declaration.property, &rule.declaration.value);
    }

    finalize(&mut map, parent);
    map
}

fn compute_pseudo_styles(
    doc: &Document,
    id: NodeId,
    sheets: &[Stylesheet],
    element_map: &StyleMap,
) -> Vec<(PseudoKind, StyleMap)> {
    let mut out = Vec::new();

    for kind in [PseudoKind::Before, PseudoKind::After, PseudoKind::FirstLetter] {
        let elem = ElementRef::with_pseudo(doc, id, kind);
        let mut matched: Vec<MatchedRule> = Vec::new();
        let mut order = 0;
        let mut caches = SelectorCaches::default();

        for sheet in sheets {
            for rule in &sheet.rules {
                if let Some(specificity) = rule_specificity_if_matches(&elem, rule, &mut caches) {
                    for decl in &rule.declarations {
                        matched.push(MatchedRule {
                            declaration: decl,
                            inline: false,
                            specificity,
                            order,
                            important: false,
                        });
                        order += 1;
                    }
                    for decl in &rule.important_declarations {
                        matched.push(MatchedRule {
                            declaration: decl,
                            inline: false,
                            specificity,
                            order,
                            important: true,
                        });
                        order += 1;
                    }
                }
            }
        }

        if matched.is_empty() {
            continue;
        }

        // Pseudo-elements inherit from their originating element
        let mut map = StyleMap::new();
        for (prop, value) in element_map {
            if defaults::is_inherited(prop) {
                map.insert(prop.clone(), value.clone());
            }
        }

        sort_matched(&mut matched);
        for rule in &matched {
            declaration::apply_declaration(&mut map, &rule.declaration.property, &rule.declaration.value);
        }
        finalize(&mut map, Some(element_map));

        // ::before and ::after only generate a box when content is set
        if matches!(kind, PseudoKind::Before | PseudoKind::After) {
            match map.get("content").map(String::as_str) {
                None | Some("none") | Some("normal") => continue,
                _ => {}
            }
        }
        out.push((kind, map));
    }

    out
}

fn sort_matched(matched: &mut [MatchedRule]) {
    if matched.len() > 1 {
        matched.sort_unstable_by(|a, b| {
            // Later entries overwrite earlier ones, so the winner sorts last
            if a.important != b.important {
                return a.important.cmp(&b.important);
            }

            if a.inline != b.inline {
                return a.inline.cmp(&b.inline);
            }

            let spec_cmp = a.specificity.cmp(&b.specificity);
            if spec_cmp != Ordering::Equal {
                return spec_cmp;
            }

            a.order.cmp(&b.order)
        });
    }
}

/// Check if a rule matches, returning the highest specificity among its
/// matching selectors.
fn rule_specificity_if_matches(
    elem: &ElementRef<'_>,
    rule: &CssRule,
    caches: &mut SelectorCaches,
) -> Option<Specificity> {
    let mode = if elem.pseudo.is_some() {
        selectors::matching::MatchingMode::ForStatelessPseudoElement
    } else {
        selectors::matching::MatchingMode::Normal
    };
    let mut context = MatchingContext::new(
        mode,
        None,
        caches,
        selectors::context::QuirksMode::NoQuirks,
        selectors::matching::NeedsSelectorFlags::No,
        selectors::matching::MatchingForInvalidation::No,
    );

    let mut best: Option<Specificity> = None;
    for selector in &rule.selectors {
        // Pseudo-element selectors only apply to the matching pseudo box
        match (elem.pseudo, selector.pseudo_element()) {
            (None, Some(_)) | (Some(_), None) => continue,
            (Some(kind), Some(pe)) if pe.kind() != kind => continue,
            _ => {}
        }
        if selectors::matching::matches_selector(selector, 0, None, elem, &mut context) {
            let specificity = Specificity::from_selector(selector);
            if best.is_none_or(|b| specificity > b) {
                best = Some(specificity);
            }
        }
    }
    best
}

// ============================================================================
// Value resolution
// ============================================================================

/// Resolve `var()` references and relative lengths into computed forms.
fn finalize(map: &mut StyleMap, parent: Option<&StyleMap>) {
    resolve_vars(map, parent);
    resolve_font_size(map, parent);
    resolve_relative_lengths(map);
}

fn resolve_vars(map: &mut StyleMap, parent: Option<&StyleMap>) {
    let pending: Vec<String> = map
        .iter()
        .filter(|(_, v)| v.contains("var("))
        .map(|(k, _)| k.clone())
        .collect();

    for prop in pending {
        let Some(value) = map.get(&prop).cloned() else { continue };
        match substitute_vars(&value, map, 8) {
            Some(resolved) => {
                map.insert(prop, resolved);
            }
            None => {
                // Invalid at computed-value time: unset
                if defaults::is_inherited(&prop)
                    && let Some(inherited) = parent.and_then(|p| p.get(&prop))
                {
                    map.insert(prop, inherited.clone());
                } else {
                    map.remove(&prop);
                }
            }
        }
    }
}

/// Substitute `var(--name, fallback)` occurrences. Returns `None` when a
/// reference cannot be resolved and has no fallback.
pub fn substitute_vars(value: &str, map: &StyleMap, depth: u32) -> Option<String> {
    if depth == 0 {
        return None;
    }
    if !value.contains("var(") {
        return Some(value.to_string());
    }

    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    let mut i = 0;

    while i + 4 <= bytes.len() {
        if bytes[i..i + 4].eq_ignore_ascii_case(b"var(") {
            let at_boundary =
                i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'-');
            if at_boundary && let Some((end, inner)) = matching_paren(value, i + 4) {
                out.push_str(&value[cursor..i]);
                let (name, fallback) = split_var_args(inner)?;
                let resolved = map.get(name).and_then(|v| substitute_vars(v, map, depth - 1));
                match resolved {
                    Some(v) => out.push_str(v.trim()),
                    None => match fallback {
                        Some(fb) => {
                            out.push_str(substitute_vars(fb.trim(), map, depth - 1)?.as_str())
                        }
                        None => return None,
                    },
                }
                cursor = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }

    out.push_str(&value[cursor..]);
    Some(out)
}

/// Find the closing paren for a block opening at `start`, returning the
/// offset past it and the inner text.
fn matching_paren(value: &str, start: usize) -> Option<(usize, &str)> {
    let bytes = value.as_bytes();
    let mut depth = 1;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((i + 1, &value[start..i]));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `--name` from its optional fallback at the first top-level comma.
fn split_var_args(inner: &str) -> Option<(&str, Option<&str>)> {
    let mut depth = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                let name = inner[..i].trim();
                if !name.starts_with("--") {
                    return None;
                }
                return Some((name, Some(&inner[i + 1..])));
            }
            _ => {}
        }
    }
    let name = inner.trim();
    if !name.starts_with("--") {
        return None;
    }
    Some((name, None))
}

fn parent_font_size(parent: Option<&StyleMap>) -> f64 {
    parent
        .and_then(|p| p.get("font-size"))
        .and_then(|v| parse_px(v))
        .unwrap_or(16.0)
}

fn resolve_font_size(map: &mut StyleMap, parent: Option<&StyleMap>) {
    let base = parent_font_size(parent);
    let Some(value) = map.get("font-size").cloned() else { return };
    let value = value.trim().to_string();

    let resolved = if let Some(em) = value.strip_suffix("em").filter(|v| !v.ends_with('r')) {
        em.trim().parse::<f64>().ok().map(|v| v * base)
    } else if let Some(rem) = value.strip_suffix("rem") {
        rem.trim().parse::<f64>().ok().map(|v| v * 16.0)
    } else if let Some(pct) = value.strip_suffix('%') {
        pct.trim().parse::<f64>().ok().map(|v| v * base / 100.0)
    } else {
        match value.as_str() {
            "xx-small" => Some(9.0),
            "x-small" => Some(10.0),
            "small" => Some(13.3333),
            "medium" => Some(16.0),
            "large" => Some(18.0),
            "x-large" => Some(24.0),
            "xx-large" => Some(32.0),
            "xxx-large" => Some(48.0),
            "smaller" => Some(base / 1.2),
            "larger" => Some(base * 1.2),
            _ => None,
        }
    };

    if let Some(px) = resolved {
        map.insert("font-size".to_string(), format_px(px));
    }
}

/// Resolve single-token `em`/`rem` lengths against the element's font size.
fn resolve_relative_lengths(map: &mut StyleMap) {
    let font_size = map.get("font-size").and_then(|v| parse_px(v)).unwrap_or(16.0);

    let pending: Vec<(String, f64)> = map
        .iter()
        .filter(|(prop, _)| *prop != "font-size" && !prop.starts_with("--"))
        .filter_map(|(prop, value)| {
            let value = value.trim();
            if value.contains(' ') || value.contains(',') {
                return None;
            }
            if let Some(em) = value.strip_suffix("em").filter(|v| !v.ends_with('r')) {
                em.parse::<f64>().ok().map(|v| (prop.clone(), v * font_size))
            } else if let Some(rem) = value.strip_suffix("rem") {
                rem.parse::<f64>().ok().map(|v| (prop.clone(), v * 16.0))
            } else {
                None
            }
        })
        .collect();

    for (prop, px) in pending {
        // line-height keeps its used-value semantics but computes to px too
        map.insert(prop, format_px(px));
    }
}

pub fn format_px(px: f64) -> String {
    if (px - px.round()).abs() < 1e-6 {
        format!("{}px", px.round() as i64)
    } else {
        let digits = format!("{px:.4}");
        let digits = digits.trim_end_matches('0').trim_end_matches('.');
        format!("{digits}px")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_html_with_css;

    fn style_of<'a>(doc: &'a Document, tag: &str) -> &'a StyleMap {
        let id = doc.find_by_tag(tag).unwrap();
        &doc.element(id).unwrap().computed
    }

    #[test]
    fn test_basic_cascade() {
        let doc = parse_html_with_css(
            "<div><p>hello</p></div>",
            "p { color: red } div p { color: blue }",
        );
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "blue");
    }

    #[test]
    fn test_important_beats_specificity() {
        let doc = parse_html_with_css(
            "<p id=\"x\">hello</p>",
            "#x { color: blue } p { color: red !important }",
        );
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "red");
    }

    #[test]
    fn test_inline_style_beats_sheet() {
        let doc = parse_html_with_css(
            "<p style=\"color: green\">hello</p>",
            "#x { color: blue } p { color: red }",
        );
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "green");
    }

    #[test]
    fn test_important_sheet_beats_inline_normal() {
        let doc = parse_html_with_css(
            "<p style=\"color: green\">hello</p>",
            "p { color: red !important }",
        );
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "red");
    }

    #[test]
    fn test_inheritance() {
        let doc = parse_html_with_css(
            "<div><span>hi</span></div>",
            "div { color: teal; margin-top: 10px }",
        );
        let span = style_of(&doc, "span");
        assert_eq!(span.get("color").unwrap(), "teal");
        assert!(span.get("margin-top").is_none());
    }

    #[test]
    fn test_ua_defaults_applied() {
        let doc = parse_html_with_css("<h1>title</h1>", "");
        let h1 = style_of(&doc, "h1");
        assert_eq!(h1.get("font-weight").unwrap(), "700");
        assert_eq!(h1.get("font-size").unwrap(), "32px");
        assert_eq!(h1.get("display").unwrap(), "block");
    }

    #[test]
    fn test_font_size_em_resolution() {
        let doc = parse_html_with_css(
            "<div><p>x</p></div>",
            "div { font-size: 20px } p { font-size: 1.5em }",
        );
        assert_eq!(style_of(&doc, "p").get("font-size").unwrap(), "30px");
    }

    #[test]
    fn test_relative_length_resolution() {
        let doc = parse_html_with_css(
            "<p>x</p>",
            "p { font-size: 20px; margin-top: 2em; padding-left: 1rem }",
        );
        let p = style_of(&doc, "p");
        assert_eq!(p.get("margin-top").unwrap(), "40px");
        assert_eq!(p.get("padding-left").unwrap(), "16px");
    }

    #[test]
    fn test_var_substitution() {
        let doc = parse_html_with_css(
            "<div><p>x</p></div>",
            ":root { --accent: rgb(1, 2, 3) } p { color: var(--accent) }",
        );
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "rgb(1, 2, 3)");
    }

    #[test]
    fn test_var_fallback() {
        let doc = parse_html_with_css("<p>x</p>", "p { color: var(--missing, teal) }");
        assert_eq!(style_of(&doc, "p").get("color").unwrap(), "teal");
    }

    #[test]
    fn test_var_unresolved_drops_property() {
        let doc = parse_html_with_css("<p>x</p>", "p { margin-top: var(--missing) }");
        assert!(style_of(&doc, "p").get("margin-top").is_none());
    }

    #[test]
    fn test_pseudo_element_styles() {
        let doc = parse_html_with_css(
            "<p>x</p>",
            "p::before { content: \"> \"; color: red }",
        );
        let id = doc.find_by_tag("p").unwrap();
        let el = doc.element(id).unwrap();
        assert_eq!(el.pseudos.len(), 1);
        let (kind, map) = &el.pseudos[0];
        assert_eq!(*kind, PseudoKind::Before);
        assert_eq!(map.get("content").unwrap(), "\"> \"");
        assert_eq!(map.get("color").unwrap(), "red");
    }

    #[test]
    fn test_pseudo_without_content_skipped() {
        let doc = parse_html_with_css("<p>x</p>", "p::before { color: red }");
        let id = doc.find_by_tag("p").unwrap();
        assert!(doc.element(id).unwrap().pseudos.is_empty());
    }

    #[test]
    fn test_substitute_vars_nested() {
        let mut map = StyleMap::new();
        map.insert("--a".to_string(), "var(--b)".to_string());
        map.insert("--b".to_string(), "blue".to_string());
        assert_eq!(substitute_vars("var(--a)", &map, 8), Some("blue".to_string()));
    }

    #[test]
    fn test_substitute_vars_cycle_fails() {
        let mut map = StyleMap::new();
        map.insert("--a".to_string(), "var(--a)".to_string());
        assert_eq!(substitute_vars("var(--a)", &map, 8), None);
    }

    #[test]
    fn test_format_px() {
        assert_eq!(format_px(32.0), "32px");
        assert_eq!(format_px(21.44), "21.44px");
        assert_eq!(format_px(13.3333), "13.3333px");
    }
}
