//! Edit tracking for an AI writing assistant: pending add, replace and
//! delete suggestions inside a rich-text document, their accept/reject
//! lifecycle, and the state behind the floating edit menu.

mod core;
mod decoration;
mod edit_registry;
mod error;
mod focus;
mod inline;
mod lifecycle;
mod ops;
mod plugin;
mod rewrite;
mod sidebar;
mod suggestion;

pub use crate::core::*;
pub use crate::decoration::*;
pub use crate::edit_registry::*;
pub use crate::error::*;
pub use crate::focus::*;
pub use crate::inline::{
    MARKER_LABEL_GRAPHEMES, canonicalize_inlines, marker_label, original_text, visible_text,
};
pub use crate::lifecycle::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::rewrite::*;
pub use crate::sidebar::*;
pub use crate::suggestion::*;

pub use redline_diff::{DiffOp, DiffOptions, DiffTag, EditKind, Fragment, FragmentNode};
