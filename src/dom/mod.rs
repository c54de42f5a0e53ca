//! Document model.
//!
//! An arena-allocated DOM whose elements carry everything a capture reads
//! from a live page: computed styles, layout rectangles, scroll offsets,
//! form state, canvas bitmaps, shadow roots, and nested iframe documents.
//!
//! Documents come from two places: [`parse::parse_html`] ingests markup and
//! runs the cascade and a coarse layout pass, while [`DocumentBuilder`]
//! constructs trees programmatically with explicit styles and rects (the
//! path a host with real measurements uses, and the path tests use).

pub mod arena;
pub mod builder;
pub mod element_ref;
pub mod layout;
pub mod node;
pub mod parse;
pub mod tree_sink;

pub use arena::{Document, Node, NodeData, NodeId};
pub use builder::DocumentBuilder;
pub use element_ref::{ElementRef, SnapSelectors, matches_selector_list, parse_selector_list};
pub use node::{
    Attribute, CanvasData, DocumentStylesheet, ElementData, FormState, PseudoKind, Rect,
    RuntimeFontFace, StyleMap, UserAgentProfile,
};
pub use parse::{parse_html, parse_html_with_css};
