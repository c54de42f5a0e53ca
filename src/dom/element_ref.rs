//! selectors crate Element implementation for the document arena.
//!
//! This enables CSS selector matching against arena elements, for both the
//! cascade and the `exclude` option. Pseudo-element selectors resolve against
//! a requested pseudo slot so `div::before` rules cascade onto the element's
//! pseudo style maps.

use std::fmt;

use cssparser::{CowRcStr, SourceLocation, match_ignore_ascii_case};
use html5ever::{LocalName, Namespace};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::context::{MatchingContext, SelectorCaches};
use selectors::matching::ElementSelectorFlags;
use selectors::parser::{ParseRelative, SelectorList, SelectorParseErrorKind};
use selectors::{OpaqueElement, SelectorImpl};

use crate::dom::arena::{Document, NodeData, NodeId};
use crate::dom::node::PseudoKind;

/// Our selector implementation for the selectors crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapSelectors;

/// Identifier string type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct IdentStr(pub String);

impl precomputed_hash::PrecomputedHash for IdentStr {
    fn precomputed_hash(&self) -> u32 {
        // Simple hash based on string content
        let mut h: u32 = 0;
        for byte in self.0.bytes() {
            h = h.wrapping_mul(31).wrapping_add(byte as u32);
        }
        h
    }
}

/// Wrapper type for LocalName that implements ToCss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CssLocalName(pub LocalName);

impl precomputed_hash::PrecomputedHash for CssLocalName {
    fn precomputed_hash(&self) -> u32 {
        self.0.precomputed_hash()
    }
}

impl cssparser::ToCss for CssLocalName {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_str(self.0.as_ref())
    }
}

impl From<String> for CssLocalName {
    fn from(s: String) -> Self {
        Self(LocalName::from(s))
    }
}

impl<'a> From<&'a str> for CssLocalName {
    fn from(s: &'a str) -> Self {
        Self(LocalName::from(s))
    }
}

impl AsRef<str> for CssLocalName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Wrapper type for Namespace that implements ToCss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CssNamespace(pub Namespace);

impl precomputed_hash::PrecomputedHash for CssNamespace {
    fn precomputed_hash(&self) -> u32 {
        self.0.precomputed_hash()
    }
}

impl cssparser::ToCss for CssNamespace {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_str(self.0.as_ref())
    }
}

impl From<String> for CssNamespace {
    fn from(s: String) -> Self {
        Self(Namespace::from(s))
    }
}

impl<'a> From<&'a str> for CssNamespace {
    fn from(s: &'a str) -> Self {
        Self(Namespace::from(s))
    }
}

impl AsRef<str> for IdentStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentStr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'a> From<&'a str> for IdentStr {
    fn from(s: &'a str) -> Self {
        Self(s.to_string())
    }
}

impl cssparser::ToCss for IdentStr {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_str(&self.0)
    }
}

/// Pseudo-element selectors the capture renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
    FirstLetter,
}

impl PseudoElement {
    pub fn kind(self) -> PseudoKind {
        match self {
            PseudoElement::Before => PseudoKind::Before,
            PseudoElement::After => PseudoKind::After,
            PseudoElement::FirstLetter => PseudoKind::FirstLetter,
        }
    }
}

impl cssparser::ToCss for PseudoElement {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        match self {
            PseudoElement::Before => dest.write_str("::before"),
            PseudoElement::After => dest.write_str("::after"),
            PseudoElement::FirstLetter => dest.write_str("::first-letter"),
        }
    }
}

impl selectors::parser::PseudoElement for PseudoElement {
    type Impl = SnapSelectors;

    fn accepts_state_pseudo_classes(&self) -> bool {
        false
    }

    fn valid_after_slotted(&self) -> bool {
        false
    }
}

/// Non-TS pseudo-class type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NonTSPseudoClass {
    Link,
    Visited,
    Hover,
    Active,
    Focus,
}

impl selectors::parser::NonTSPseudoClass for NonTSPseudoClass {
    type Impl = SnapSelectors;

    fn is_active_or_hover(&self) -> bool {
        matches!(self, Self::Hover | Self::Active)
    }

    fn is_user_action_state(&self) -> bool {
        matches!(self, Self::Hover | Self::Active | Self::Focus)
    }
}

impl cssparser::ToCss for NonTSPseudoClass {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        match self {
            Self::Link => dest.write_str(":link"),
            Self::Visited => dest.write_str(":visited"),
            Self::Hover => dest.write_str(":hover"),
            Self::Active => dest.write_str(":active"),
            Self::Focus => dest.write_str(":focus"),
        }
    }
}

impl<'i> selectors::parser::Parser<'i> for SnapSelectors {
    type Impl = SnapSelectors;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_non_ts_pseudo_class(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<NonTSPseudoClass, cssparser::ParseError<'i, Self::Error>> {
        match_ignore_ascii_case! { &name,
            "link" => Ok(NonTSPseudoClass::Link),
            "visited" => Ok(NonTSPseudoClass::Visited),
            "hover" => Ok(NonTSPseudoClass::Hover),
            "active" => Ok(NonTSPseudoClass::Active),
            "focus" => Ok(NonTSPseudoClass::Focus),
            _ => Err(location.new_custom_error(
                SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
            )),
        }
    }

    fn parse_pseudo_element(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoElement, cssparser::ParseError<'i, Self::Error>> {
        match_ignore_ascii_case! { &name,
            "before" => Ok(PseudoElement::Before),
            "after" => Ok(PseudoElement::After),
            "first-letter" => Ok(PseudoElement::FirstLetter),
            _ => Err(location.new_custom_error(
                SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
            )),
        }
    }
}

impl SelectorImpl for SnapSelectors {
    type ExtraMatchingData<'a> = ();
    type AttrValue = IdentStr;
    type Identifier = IdentStr;
    type LocalName = CssLocalName;
    type NamespaceUrl = CssNamespace;
    type NamespacePrefix = IdentStr;
    type BorrowedLocalName = CssLocalName;
    type BorrowedNamespaceUrl = CssNamespace;
    type NonTSPseudoClass = NonTSPseudoClass;
    type PseudoElement = PseudoElement;
}

/// Reference to a document element for selector matching.
///
/// `pseudo` names the pseudo slot being matched when a rule carries a
/// pseudo-element selector; `None` matches the element itself.
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    pub doc: &'a Document,
    pub id: NodeId,
    pub pseudo: Option<PseudoKind>,
}

impl<'a> ElementRef<'a> {
    pub fn new(doc: &'a Document, id: NodeId) -> Self {
        Self {
            doc,
            id,
            pseudo: None,
        }
    }

    pub fn with_pseudo(doc: &'a Document, id: NodeId, pseudo: PseudoKind) -> Self {
        Self {
            doc,
            id,
            pseudo: Some(pseudo),
        }
    }
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("id", &self.id)
            .field("name", &self.doc.element_name(self.id))
            .finish()
    }
}

impl<'a> selectors::Element for ElementRef<'a> {
    type Impl = SnapSelectors;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self)
    }

    fn parent_element(&self) -> Option<Self> {
        let node = self.doc.get(self.id)?;
        if node.parent.is_none() {
            return None;
        }
        // Only return if parent is an element
        if self.doc.is_element(node.parent) {
            Some(Self::new(self.doc, node.parent))
        } else {
            None
        }
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        let parent = match self.doc.get(self.id) {
            Some(n) => n.parent,
            None => return false,
        };
        self.doc
            .get(parent)
            .is_some_and(|n| matches!(n.data, NodeData::ShadowRoot))
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        let mut current = self.id;
        while let Some(node) = self.doc.get(current) {
            if node.parent.is_none() {
                return None;
            }
            if let Some(parent) = self.doc.get(node.parent)
                && matches!(parent.data, NodeData::ShadowRoot)
            {
                // The shadow container's parent link is its host
                let host = parent.parent;
                return if self.doc.is_element(host) {
                    Some(Self::new(self.doc, host))
                } else {
                    None
                };
            }
            current = node.parent;
        }
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let node = self.doc.get(self.id)?;
        let mut current = node.prev_sibling;
        while current.is_some() {
            if self.doc.is_element(current) {
                return Some(Self::new(self.doc, current));
            }
            current = self.doc.get(current)?.prev_sibling;
        }
        None
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let node = self.doc.get(self.id)?;
        let mut current = node.next_sibling;
        while current.is_some() {
            if self.doc.is_element(current) {
                return Some(Self::new(self.doc, current));
            }
            current = self.doc.get(current)?.next_sibling;
        }
        None
    }

    fn first_element_child(&self) -> Option<Self> {
        for child in self.doc.children(self.id) {
            if self.doc.is_element(child) {
                return Some(Self::new(self.doc, child));
            }
        }
        None
    }

    fn is_html_element_in_html_document(&self) -> bool {
        // Assume HTML document
        true
    }

    fn has_local_name(&self, name: &CssLocalName) -> bool {
        self.doc.element_name(self.id).is_some_and(|n| n == &name.0)
    }

    fn has_namespace(&self, ns: &CssNamespace) -> bool {
        self.doc
            .element_namespace(self.id)
            .is_some_and(|n| n == &ns.0)
    }

    fn is_same_type(&self, other: &Self) -> bool {
        let self_name = self.doc.element_name(self.id);
        let other_name = other.doc.element_name(other.id);
        self_name == other_name
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssNamespace>,
        local_name: &CssLocalName,
        operation: &AttrSelectorOperation<&IdentStr>,
    ) -> bool {
        let attrs = match self.doc.element(self.id) {
            Some(el) => &el.attrs,
            None => return false,
        };

        for attr in attrs {
            // Check namespace
            let ns_match = match ns {
                NamespaceConstraint::Any => true,
                NamespaceConstraint::Specific(ns) => attr.name.ns == ns.0,
            };
            if !ns_match {
                continue;
            }

            // Check local name
            if attr.name.local != local_name.0 {
                continue;
            }

            // Check value operation
            return operation.eval_str(&attr.value);
        }
        false
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<'_, Self::Impl>,
    ) -> bool {
        match pc {
            NonTSPseudoClass::Link => {
                // Check if this is an <a> with href
                let is_anchor = self
                    .doc
                    .element_name(self.id)
                    .is_some_and(|n| n.as_ref() == "a");
                is_anchor && self.doc.get_attr(self.id, "href").is_some()
            }
            // Other pseudo-classes don't apply in static context
            _ => false,
        }
    }

    fn match_pseudo_element(
        &self,
        pe: &PseudoElement,
        _context: &mut MatchingContext<'_, Self::Impl>,
    ) -> bool {
        self.pseudo == Some(pe.kind())
    }

    fn is_link(&self) -> bool {
        let is_anchor = self
            .doc
            .element_name(self.id)
            .is_some_and(|n| n.as_ref() == "a");
        is_anchor && self.doc.get_attr(self.id, "href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        self.doc
            .element_name(self.id)
            .is_some_and(|n| n.as_ref() == "slot")
    }

    fn has_id(&self, id: &IdentStr, case_sensitivity: CaseSensitivity) -> bool {
        let elem_id = match self.doc.element_id(self.id) {
            Some(i) => i,
            None => return false,
        };
        case_sensitivity.eq(elem_id.as_bytes(), id.0.as_bytes())
    }

    fn has_class(&self, name: &IdentStr, case_sensitivity: CaseSensitivity) -> bool {
        let classes = self.doc.element_classes(self.id);
        classes
            .iter()
            .any(|c| case_sensitivity.eq(c.as_bytes(), name.0.as_bytes()))
    }

    fn imported_part(&self, _name: &IdentStr) -> Option<IdentStr> {
        None
    }

    fn is_part(&self, _name: &IdentStr) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        for child in self.doc.children(self.id) {
            let node = match self.doc.get(child) {
                Some(n) => n,
                None => continue,
            };
            match &node.data {
                NodeData::Element(_) => return false,
                NodeData::Text(t) if !t.trim().is_empty() => return false,
                _ => {}
            }
        }
        true
    }

    fn is_root(&self) -> bool {
        // Root is the element directly under the document node
        let parent = self.doc.get(self.id).map(|n| n.parent);
        if let Some(parent) = parent
            && let Some(parent_node) = self.doc.get(parent)
        {
            return matches!(parent_node.data, NodeData::Document);
        }
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {
        // We don't need to track selector flags for our use case
    }

    fn add_element_unique_hashes(&self, _filter: &mut selectors::bloom::BloomFilter) -> bool {
        // No bloom filter support needed
        false
    }

    fn has_custom_state(&self, _name: &IdentStr) -> bool {
        false
    }
}

/// Parse a comma-separated selector list.
pub fn parse_selector_list(
    input: &str,
) -> Result<
    SelectorList<SnapSelectors>,
    cssparser::ParseError<'_, SelectorParseErrorKind<'_>>,
> {
    let mut parser_input = cssparser::ParserInput::new(input);
    let mut parser = cssparser::Parser::new(&mut parser_input);
    SelectorList::parse(&SnapSelectors, &mut parser, ParseRelative::No)
}

/// Test an element (or one of its pseudo slots) against a single selector.
pub fn matches_selector(
    elem: &ElementRef<'_>,
    selector: &selectors::parser::Selector<SnapSelectors>,
) -> bool {
    let mut caches = SelectorCaches::default();
    let mode = if elem.pseudo.is_some() {
        selectors::matching::MatchingMode::ForStatelessPseudoElement
    } else {
        selectors::matching::MatchingMode::Normal
    };
    let mut context = MatchingContext::new(
        mode,
        None,
        &mut caches,
        selectors::context::QuirksMode::NoQuirks,
        selectors::matching::NeedsSelectorFlags::No,
        selectors::matching::MatchingForInvalidation::No,
    );
    selectors::matching::matches_selector(selector, 0, None, elem, &mut context)
}

/// Test an element against any selector in a list.
pub fn matches_selector_list(
    doc: &Document,
    id: NodeId,
    list: &SelectorList<SnapSelectors>,
) -> bool {
    let elem = ElementRef::new(doc, id);
    list.slice()
        .iter()
        .any(|sel| matches_selector(&elem, sel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_html;

    fn parse_one(
        s: &str,
    ) -> Result<
        selectors::parser::Selector<SnapSelectors>,
        cssparser::ParseError<'_, SelectorParseErrorKind<'_>>,
    > {
        let mut parser_input = cssparser::ParserInput::new(s);
        let mut parser = cssparser::Parser::new(&mut parser_input);
        selectors::parser::Selector::parse(&SnapSelectors, &mut parser)
    }

    #[test]
    fn test_tag_selector() {
        let doc = parse_html("<div><p>Hello</p></div>");
        let p = doc.find_by_tag("p").unwrap();
        let elem = ElementRef::new(&doc, p);

        let selector = parse_one("p").unwrap();
        assert!(matches_selector(&elem, &selector));

        let selector = parse_one("div").unwrap();
        assert!(!matches_selector(&elem, &selector));
    }

    #[test]
    fn test_class_selector() {
        let doc = parse_html(r#"<p class="intro highlight">Hello</p>"#);
        let p = doc.find_by_tag("p").unwrap();
        let elem = ElementRef::new(&doc, p);

        assert!(matches_selector(&elem, &parse_one(".intro").unwrap()));
        assert!(matches_selector(&elem, &parse_one(".highlight").unwrap()));
        assert!(matches_selector(&elem, &parse_one("p.intro").unwrap()));
        assert!(!matches_selector(&elem, &parse_one(".missing").unwrap()));
    }

    #[test]
    fn test_id_selector() {
        let doc = parse_html(r#"<p id="main">Hello</p>"#);
        let p = doc.find_by_tag("p").unwrap();
        let elem = ElementRef::new(&doc, p);

        assert!(matches_selector(&elem, &parse_one("#main").unwrap()));
        assert!(matches_selector(&elem, &parse_one("p#main").unwrap()));
        assert!(!matches_selector(&elem, &parse_one("#other").unwrap()));
    }

    #[test]
    fn test_descendant_selector() {
        let doc = parse_html("<div><span><p>Hello</p></span></div>");
        let p = doc.find_by_tag("p").unwrap();
        let elem = ElementRef::new(&doc, p);

        assert!(matches_selector(&elem, &parse_one("div p").unwrap()));
        assert!(matches_selector(&elem, &parse_one("div span p").unwrap()));
        assert!(matches_selector(&elem, &parse_one("span p").unwrap()));
    }

    #[test]
    fn test_child_selector() {
        let doc = parse_html("<div><p>Direct</p></div>");
        let p = doc.find_by_tag("p").unwrap();
        let elem = ElementRef::new(&doc, p);

        assert!(matches_selector(&elem, &parse_one("div > p").unwrap()));

        let doc2 = parse_html("<div><span><p>Nested</p></span></div>");
        let p2 = doc2.find_by_tag("p").unwrap();
        let elem2 = ElementRef::new(&doc2, p2);

        assert!(!matches_selector(&elem2, &parse_one("div > p").unwrap()));
        assert!(matches_selector(&elem2, &parse_one("span > p").unwrap()));
    }

    #[test]
    fn test_pseudo_element_selector() {
        let doc = parse_html(r#"<p class="note">Hello</p>"#);
        let p = doc.find_by_tag("p").unwrap();

        let selector = parse_one(".note::before").unwrap();
        let plain = ElementRef::new(&doc, p);
        assert!(!matches_selector(&plain, &selector));

        let before = ElementRef::with_pseudo(&doc, p, PseudoKind::Before);
        assert!(matches_selector(&before, &selector));

        let after = ElementRef::with_pseudo(&doc, p, PseudoKind::After);
        assert!(!matches_selector(&after, &selector));
    }

    #[test]
    fn test_selector_list_matching() {
        let doc = parse_html(r#"<div class="x">X</div>"#);
        let div = doc.find_by_tag("div").unwrap();

        let list = parse_selector_list(".missing, .x").unwrap();
        assert!(matches_selector_list(&doc, div, &list));

        let list = parse_selector_list(".a, .b").unwrap();
        assert!(!matches_selector_list(&doc, div, &list));
    }
}
