//! Programmatic document construction.
//!
//! [`DocumentBuilder`] assembles a document the way a host with real
//! measurements would: computed styles, layout rects, scroll offsets, shadow
//! roots, canvas bitmaps, and font sets are all stated explicitly instead of
//! derived. Fresh elements start from the UA baseline for their tag, so an
//! element with no extra styles snapshots to an empty style key.

use std::sync::Arc;

use crate::css::declaration::apply_declaration;
use crate::dom::arena::{Document, NodeId};
use crate::dom::node::{
    CanvasData, DocumentStylesheet, PseudoKind, Rect, RuntimeFontFace, UserAgentProfile,
};
use crate::style::defaults;

/// Imperative builder over a document arena.
pub struct DocumentBuilder {
    doc: Document,
    body: NodeId,
}

impl DocumentBuilder {
    /// Start a document with an `<html><body>` scaffold.
    pub fn new() -> Self {
        let mut doc = Document::new();
        let html = doc.create_el("html");
        let body = doc.create_el("body");
        let root = doc.document();
        doc.append(root, html);
        doc.append(html, body);

        let mut builder = Self { doc, body };
        builder.seed_defaults(html);
        builder.seed_defaults(body);
        builder.set_style(body, "margin", "0px");
        builder
    }

    pub fn viewport(mut self, width: f64, height: f64) -> Self {
        self.doc.viewport = (width, height);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.doc.base_url = Some(url.into());
        self
    }

    pub fn ua_profile(mut self, profile: UserAgentProfile) -> Self {
        self.doc.ua_profile = profile;
        self
    }

    /// The `<body>` scaffold element.
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Create an element under `parent`, seeded with its tag's UA baseline.
    pub fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.doc.create_el(tag);
        self.doc.append(parent, id);
        self.seed_defaults(id);
        id
    }

    /// Create an element directly under `<body>`.
    pub fn el(&mut self, tag: &str) -> NodeId {
        self.element(self.body, tag)
    }

    pub fn text(&mut self, parent: NodeId, text: &str) {
        self.doc.append_text(parent, text);
    }

    pub fn attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.doc.set_attr(id, name, value);
    }

    /// Set a computed style. Shorthands expand into their longhands, the
    /// same way the cascade applies declarations.
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        if let Some(el) = self.doc.element_mut(id) {
            apply_declaration(&mut el.computed, property, value);
        }
    }

    pub fn styles(&mut self, id: NodeId, pairs: &[(&str, &str)]) {
        for (property, value) in pairs {
            self.set_style(id, property, value);
        }
    }

    /// Set a pseudo-element's computed style map.
    pub fn pseudo(&mut self, id: NodeId, kind: PseudoKind, pairs: &[(&str, &str)]) {
        if let Some(el) = self.doc.element_mut(id) {
            let map = match el.pseudos.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, map)) => map,
                None => {
                    el.pseudos.push((kind, Default::default()));
                    let last = el.pseudos.len() - 1;
                    &mut el.pseudos[last].1
                }
            };
            for (property, value) in pairs {
                apply_declaration(map, property, value);
            }
        }
    }

    pub fn rect(&mut self, id: NodeId, x: f64, y: f64, width: f64, height: f64) {
        if let Some(el) = self.doc.element_mut(id) {
            el.rect = Rect::new(x, y, width, height);
        }
    }

    pub fn scroll(&mut self, id: NodeId, left: f64, top: f64) {
        if let Some(el) = self.doc.element_mut(id) {
            el.scroll_left = left;
            el.scroll_top = top;
        }
    }

    pub fn form_value(&mut self, id: NodeId, value: &str) {
        if let Some(el) = self.doc.element_mut(id) {
            el.form.value = Some(value.to_string());
        }
    }

    pub fn checked(&mut self, id: NodeId, checked: bool) {
        if let Some(el) = self.doc.element_mut(id) {
            el.form.checked = Some(checked);
        }
    }

    pub fn indeterminate(&mut self, id: NodeId) {
        if let Some(el) = self.doc.element_mut(id) {
            el.form.indeterminate = true;
        }
    }

    pub fn selected(&mut self, id: NodeId) {
        if let Some(el) = self.doc.element_mut(id) {
            el.form.selected = true;
        }
    }

    /// Attach canvas pixel data (tightly packed RGBA).
    pub fn canvas(&mut self, id: NodeId, width: u32, height: u32, pixels: Option<Vec<u8>>) {
        if let Some(el) = self.doc.element_mut(id) {
            el.canvas = Some(CanvasData {
                width,
                height,
                pixels: pixels.map(Arc::new),
                tainted: false,
            });
        }
    }

    pub fn tainted_canvas(&mut self, id: NodeId, width: u32, height: u32) {
        if let Some(el) = self.doc.element_mut(id) {
            el.canvas = Some(CanvasData {
                width,
                height,
                pixels: None,
                tainted: true,
            });
        }
    }

    /// Attach a shadow root to a host element; returns the shadow container.
    pub fn shadow_root(&mut self, host: NodeId) -> NodeId {
        self.doc.attach_shadow(host)
    }

    /// Record slot assignment (light-DOM nodes rendered by the slot).
    pub fn assign_to_slot(&mut self, slot: NodeId, nodes: &[NodeId]) {
        if let Some(el) = self.doc.element_mut(slot) {
            el.assigned_nodes = nodes.to_vec();
        }
    }

    /// Attach a same-origin inner document to an `<iframe>`.
    pub fn iframe_document(&mut self, id: NodeId, inner: Document) {
        if let Some(el) = self.doc.element_mut(id) {
            el.iframe = Some(Arc::new(inner));
        }
    }

    /// Record the responsive source currently chosen for an `<img>`.
    pub fn current_src(&mut self, id: NodeId, url: &str) {
        if let Some(el) = self.doc.element_mut(id) {
            el.current_src = Some(url.to_string());
        }
    }

    pub fn stylesheet(&mut self, css: impl Into<String>) {
        self.doc.add_stylesheet(DocumentStylesheet::inline(css));
    }

    pub fn linked_stylesheet(
        &mut self,
        href: impl Into<String>,
        text: Option<String>,
        same_origin: bool,
    ) {
        self.doc
            .add_stylesheet(DocumentStylesheet::linked(href, text, same_origin));
    }

    pub fn font_face(&mut self, face: RuntimeFontFace) {
        self.doc.add_font_face(face);
    }

    pub fn finish(self) -> Document {
        self.doc
    }

    fn seed_defaults(&mut self, id: NodeId) {
        let tag = match self.doc.element(id) {
            Some(el) => el.tag().to_string(),
            None => return,
        };
        let baseline = defaults::baseline_style(&tag);
        if let Some(el) = self.doc.element_mut(id) {
            el.computed = baseline;
        }
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
