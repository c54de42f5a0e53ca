//! CSS parsing for style capture.
//!
//! Author stylesheets, style attributes, and individual property values are
//! parsed here. The cascade itself lives in [`crate::style`].

pub mod background;
pub mod declaration;
pub mod stylesheet;
pub mod unicode_range;
pub mod values;

pub use declaration::{Declaration, apply_declaration, parse_declaration_list};
pub use stylesheet::{CssRule, FontFaceRule, Specificity, Stylesheet};
