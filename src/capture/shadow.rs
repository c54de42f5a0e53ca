//! Shadow-DOM style scoping.
//!
//! Shadow trees flatten into the clone, so their stylesheets must stop
//! leaking: every selector is prefixed with the host's scope attribute
//! (`[data-sd="sN"]`) and suffixed `:not([data-sd-slotted])` so slotted
//! light-DOM content keeps its own styling. `::slotted(...)` selectors
//! unwrap into plain descendant selectors, and `:host` maps onto the scope
//! attribute itself.

use crate::dom::node::StyleMap;

/// Attribute marking a scoped host and its injected stylesheet.
pub(crate) const SCOPE_ATTR: &str = "data-sd";
/// Attribute marking light-DOM nodes pulled through a slot.
pub(crate) const SLOTTED_ATTR: &str = "data-sd-slotted";

/// Rewrite a shadow stylesheet so it only applies under `scope`.
pub(crate) fn rewrite_shadow_css(css: &str, scope: &str) -> String {
    let mut out = String::with_capacity(css.len() + css.len() / 4);
    rewrite_block(css, scope, &mut out);
    out
}

fn rewrite_block(css: &str, scope: &str, out: &mut String) {
    let mut rest = css;
    while let Some((prelude, block, after)) = next_rule(rest) {
        let trimmed = prelude.trim();
        if trimmed.is_empty() {
            rest = after;
            continue;
        }
        if let Some(at_rule) = trimmed.strip_prefix('@') {
            let keyword = at_rule.split_whitespace().next().unwrap_or("");
            if matches!(keyword, "media" | "supports" | "layer" | "container") {
                // Conditional group rules scope their inner rules.
                out.push_str(trimmed);
                out.push('{');
                rewrite_block(block, scope, out);
                out.push('}');
            } else {
                // @font-face, @keyframes and friends pass through whole.
                out.push_str(trimmed);
                out.push('{');
                out.push_str(block);
                out.push('}');
            }
        } else {
            let rewritten: Vec<String> = split_selectors(trimmed)
                .iter()
                .map(|sel| rewrite_selector(sel.trim(), scope))
                .collect();
            out.push_str(&rewritten.join(","));
            out.push('{');
            out.push_str(block.trim());
            out.push('}');
        }
        rest = after;
    }
    // Statements without blocks (@import and stray text) are dropped; the
    // font embedder handles imports separately.
}

/// Scope one selector.
pub(crate) fn rewrite_selector(selector: &str, scope: &str) -> String {
    if selector.is_empty() {
        return selector.to_string();
    }
    let scope_prefix = format!("[{SCOPE_ATTR}=\"{scope}\"]");
    // Already wrapped by a previous pass.
    if selector.starts_with(&format!("[{SCOPE_ATTR}=")) {
        return selector.to_string();
    }

    if let Some(rewritten) = unwrap_slotted(selector) {
        // Slotted content is light DOM: descend from the scope, no
        // not-clause so the slotted marker keeps matching.
        return format!("{scope_prefix} {rewritten}");
    }

    if let Some(rest) = selector.strip_prefix(":host") {
        // `:host(.x)` folds the argument onto the scope attribute.
        if let Some(inner) = rest.strip_prefix('(')
            && let Some(close) = find_balanced(inner)
        {
            return format!("{scope_prefix}{}{}", &inner[..close], &inner[close + 1..]);
        }
        return format!("{scope_prefix}{rest}");
    }

    let suffixed = append_not_slotted(selector);
    format!("{scope_prefix} {suffixed}")
}

/// Append `:not([data-sd-slotted])` to the rightmost compound, keeping any
/// pseudo-element suffix after it.
fn append_not_slotted(selector: &str) -> String {
    let not_clause = format!(":not([{SLOTTED_ATTR}])");
    if selector.contains(&not_clause) {
        return selector.to_string();
    }
    if let Some(idx) = selector.rfind("::") {
        let (before, pseudo) = selector.split_at(idx);
        return format!("{before}{not_clause}{pseudo}");
    }
    format!("{selector}{not_clause}")
}

/// Turn `X::slotted(INNER)` into `X INNER`; `None` when the selector has no
/// slotted part.
fn unwrap_slotted(selector: &str) -> Option<String> {
    let idx = selector.find("::slotted(")?;
    let before = selector[..idx].trim_end();
    let inner_start = idx + "::slotted(".len();
    let inner = &selector[inner_start..];
    let close = find_balanced(inner)?;
    let inner_sel = inner[..close].trim();
    let after = inner[close + 1..].trim();
    let mut result = String::new();
    if !before.is_empty() {
        result.push_str(before);
        result.push(' ');
    }
    result.push_str(inner_sel);
    result.push_str(after);
    Some(result)
}

/// Index of the `)` closing the parenthesized group that starts at the
/// beginning of `s` (the opening paren is not included in `s`).
fn find_balanced(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Split a selector prelude on top-level commas.
fn split_selectors(prelude: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = prelude.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&prelude[start..i]);
                start = i + 1;
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&prelude[start..]);
    parts
}

/// Find the next `prelude { block }` in `css`, skipping strings. Returns
/// `(prelude, block, rest)`.
fn next_rule(css: &str) -> Option<(&str, &str, &str)> {
    let bytes = css.as_bytes();
    let mut i = 0;
    let mut open = None;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                open = Some(i);
                break;
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let open = open?;
    let mut depth = 1usize;
    let mut j = open + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&css[..open], &css[open + 1..j], &css[j + 1..]));
                }
            }
            b'"' | b'\'' => {
                let quote = bytes[j];
                j += 1;
                while j < bytes.len() && bytes[j] != quote {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Collect custom property names referenced through `var(--x)` in a sheet.
fn referenced_custom_properties(css: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = css;
    while let Some(idx) = rest.find("var(") {
        let after = &rest[idx + 4..];
        let name: String = after
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if name.starts_with("--") && !names.contains(&name) {
            names.push(name);
        }
        rest = after;
    }
    names
}

/// Build the seed rule giving the scope the custom-property values its CSS
/// reads, resolved from the host's computed style with the root element as
/// fallback.
pub(crate) fn seed_rule(
    css: &str,
    scope: &str,
    host: &StyleMap,
    root: Option<&StyleMap>,
) -> Option<String> {
    let mut declarations = String::new();
    for name in referenced_custom_properties(css) {
        let value = host
            .get(&name)
            .or_else(|| root.and_then(|map| map.get(&name)));
        if let Some(value) = value {
            declarations.push_str(&name);
            declarations.push(':');
            declarations.push_str(value);
            declarations.push(';');
        }
    }
    if declarations.is_empty() {
        return None;
    }
    Some(format!("[{SCOPE_ATTR}=\"{scope}\"]{{{declarations}}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_gets_prefix_and_not_clause() {
        assert_eq!(
            rewrite_selector(".btn", "s1"),
            "[data-sd=\"s1\"] .btn:not([data-sd-slotted])"
        );
    }

    #[test]
    fn test_not_clause_precedes_pseudo_element() {
        assert_eq!(
            rewrite_selector(".btn::before", "s2"),
            "[data-sd=\"s2\"] .btn:not([data-sd-slotted])::before"
        );
    }

    #[test]
    fn test_slotted_unwraps_without_not_clause() {
        assert_eq!(
            rewrite_selector("slot::slotted(.item)", "s1"),
            "[data-sd=\"s1\"] slot .item"
        );
        assert_eq!(
            rewrite_selector("::slotted(span)", "s1"),
            "[data-sd=\"s1\"] span"
        );
    }

    #[test]
    fn test_host_maps_to_scope() {
        assert_eq!(rewrite_selector(":host", "s3"), "[data-sd=\"s3\"]");
        assert_eq!(
            rewrite_selector(":host(.dark)", "s3"),
            "[data-sd=\"s3\"].dark"
        );
        assert_eq!(
            rewrite_selector(":host .inner", "s3"),
            "[data-sd=\"s3\"] .inner"
        );
    }

    #[test]
    fn test_already_wrapped_left_alone() {
        let sel = "[data-sd=\"s1\"] .x:not([data-sd-slotted])";
        assert_eq!(rewrite_selector(sel, "s1"), sel);
    }

    #[test]
    fn test_rewrite_sheet_with_media_and_keyframes() {
        let css = ".a{color:red}@media (min-width:600px){.b{color:blue}}@keyframes spin{from{transform:none}}";
        let out = rewrite_shadow_css(css, "s1");
        assert!(out.contains("[data-sd=\"s1\"] .a:not([data-sd-slotted]){color:red}"));
        assert!(out.contains("@media (min-width:600px){[data-sd=\"s1\"] .b:not([data-sd-slotted]){color:blue}}"));
        // Keyframe inner selectors stay untouched
        assert!(out.contains("@keyframes spin{from{transform:none}}"));
    }

    #[test]
    fn test_selector_list_split_respects_parens() {
        let css = ".a,.b:is(.c,.d){color:red}";
        let out = rewrite_shadow_css(css, "s1");
        assert!(out.contains("[data-sd=\"s1\"] .a:not([data-sd-slotted])"));
        assert!(out.contains("[data-sd=\"s1\"] .b:is(.c,.d):not([data-sd-slotted])"));
    }

    #[test]
    fn test_seed_rule_resolves_from_host_then_root() {
        let css = ".x{color:var(--accent);background:var(--bg, white)}";
        let mut host = StyleMap::new();
        host.insert("--accent".to_string(), "rebeccapurple".to_string());
        let mut root = StyleMap::new();
        root.insert("--bg".to_string(), "black".to_string());
        let rule = seed_rule(css, "s1", &host, Some(&root)).unwrap();
        assert_eq!(
            rule,
            "[data-sd=\"s1\"]{--accent:rebeccapurple;--bg:black;}"
        );
    }

    #[test]
    fn test_seed_rule_none_when_no_vars() {
        assert!(seed_rule(".x{color:red}", "s1", &StyleMap::new(), None).is_none());
    }
}
