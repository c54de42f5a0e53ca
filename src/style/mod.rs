//! Style system: cascade, snapshots, and class pooling.
//!
//! This module contains:
//! - The CSS cascade that fills in computed style maps
//! - UA default tables and the snapshot diffing against them
//! - The class pool that deduplicates snapshot keys into generated classes

mod cascade;
mod compress;
pub mod defaults;
mod pool;
mod snapshot;

pub use cascade::{compute_document_styles, compute_element_style, format_px, substitute_vars};
pub(crate) use compress::compress_styles;
pub use pool::ClassPool;
pub use snapshot::StyleCache;
