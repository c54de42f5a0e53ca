//! Node payloads for the document arena.
//!
//! Elements carry everything a capture reads from a live document: resolved
//! computed styles, layout rectangles, scroll offsets, form-control state,
//! canvas bitmaps, shadow roots, and nested iframe documents.

use std::collections::BTreeMap;
use std::sync::Arc;

use html5ever::QualName;

use crate::dom::Document;

/// HTML attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

/// Border-box rectangle in document coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Live form-control state that attribute serialization would otherwise lose.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    /// Current value of `<input>`, `<textarea>`, or `<select>`.
    pub value: Option<String>,
    /// Current checkedness of checkbox/radio inputs.
    pub checked: Option<bool>,
    /// Indeterminate flag on checkbox inputs.
    pub indeterminate: bool,
    /// Whether this `<option>` is currently selected.
    pub selected: bool,
}

/// Pixel contents of a `<canvas>` element.
///
/// `pixels` is tightly packed RGBA. A canvas with no pixel data reads as
/// fully transparent, matching what a scratch-copy of an unpainted canvas
/// yields. A tainted canvas refuses export entirely.
#[derive(Debug, Clone, Default)]
pub struct CanvasData {
    pub width: u32,
    pub height: u32,
    pub pixels: Option<Arc<Vec<u8>>>,
    pub tainted: bool,
}

/// Rendered pseudo-element slots captured per source element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoKind {
    Before,
    After,
    FirstLetter,
}

impl PseudoKind {
    pub fn as_selector(self) -> &'static str {
        match self {
            PseudoKind::Before => "::before",
            PseudoKind::After => "::after",
            PseudoKind::FirstLetter => "::first-letter",
        }
    }
}

/// Browser engine profile of the environment being mirrored.
///
/// WebKit needs an extra pixel of padding around the foreignObject to avoid
/// clipping at fractional scale factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserAgentProfile {
    #[default]
    Gecko,
    Blink,
    WebKit,
}

impl UserAgentProfile {
    pub fn needs_foreign_object_pad(self) -> bool {
        matches!(self, UserAgentProfile::WebKit)
    }
}

/// A font registered on the document's font set.
///
/// `snapdom_src` mirrors the `_snapdomSrc` escape hatch: a source URL the
/// embedder may inline even when the face has no stylesheet rule.
#[derive(Debug, Clone)]
pub struct RuntimeFontFace {
    pub family: String,
    pub weight: String,
    pub style: String,
    pub stretch: String,
    pub snapdom_src: Option<String>,
}

impl RuntimeFontFace {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            weight: "400".to_string(),
            style: "normal".to_string(),
            stretch: "100%".to_string(),
            snapdom_src: None,
        }
    }
}

/// A stylesheet reachable from the document.
#[derive(Debug, Clone)]
pub struct DocumentStylesheet {
    /// Resolved href for linked sheets; `None` for inline `<style>`.
    pub href: Option<String>,
    /// Sheet text when readable. Cross-origin linked sheets leave this
    /// `None` and the font embedder fetches `href` instead.
    pub text: Option<String>,
    pub same_origin: bool,
}

impl DocumentStylesheet {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            href: None,
            text: Some(text.into()),
            same_origin: true,
        }
    }

    pub fn linked(href: impl Into<String>, text: Option<String>, same_origin: bool) -> Self {
        Self {
            href: Some(href.into()),
            text,
            same_origin,
        }
    }
}

/// Ordered computed-style map, alphabetical by property name.
pub type StyleMap = BTreeMap<String, String>;

/// Element payload.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub name: QualName,
    pub attrs: Vec<Attribute>,
    /// Pre-extracted id for fast matching.
    pub id: Option<String>,
    /// Pre-extracted classes for fast matching.
    pub classes: Vec<String>,
    /// Resolved computed style. Empty until the cascade or a builder fills it.
    pub computed: StyleMap,
    /// Computed styles of rendered pseudo-elements.
    pub pseudos: Vec<(PseudoKind, StyleMap)>,
    /// Border-box rect assigned by layout or the builder.
    pub rect: Rect,
    pub scroll_left: f64,
    pub scroll_top: f64,
    pub form: FormState,
    pub canvas: Option<CanvasData>,
    /// Shadow root container node, if this element hosts one.
    pub shadow_root: Option<super::NodeId>,
    /// For `<slot>` elements: assigned light-DOM nodes, in assignment order.
    pub assigned_nodes: Vec<super::NodeId>,
    /// For `<iframe>`: the inner document when it is same-origin accessible.
    pub iframe: Option<Arc<Document>>,
    /// Responsive source currently chosen for an `<img>` (`currentSrc`).
    pub current_src: Option<String>,
}

impl ElementData {
    pub fn new(name: QualName, attrs: Vec<Attribute>) -> Self {
        let mut id = None;
        let mut classes = Vec::new();
        for attr in &attrs {
            if attr.name.local.as_ref() == "id" {
                id = Some(attr.value.clone());
            } else if attr.name.local.as_ref() == "class" {
                classes = attr
                    .value
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect();
            }
        }
        Self {
            name,
            attrs,
            id,
            classes,
            computed: StyleMap::new(),
            pseudos: Vec::new(),
            rect: Rect::default(),
            scroll_left: 0.0,
            scroll_top: 0.0,
            form: FormState::default(),
            canvas: None,
            shadow_root: None,
            assigned_nodes: Vec::new(),
            iframe: None,
            current_src: None,
        }
    }

    /// Local tag name.
    pub fn tag(&self) -> &str {
        self.name.local.as_ref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.local.as_ref() == name)
            .map(|a| a.value.as_str())
    }

    /// Computed style lookup.
    pub fn style(&self, property: &str) -> Option<&str> {
        self.computed.get(property).map(|s| s.as_str())
    }

    /// Computed style of a pseudo-element slot.
    pub fn pseudo_style(&self, kind: PseudoKind) -> Option<&StyleMap> {
        self.pseudos
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, map)| map)
    }
}
