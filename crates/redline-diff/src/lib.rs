mod cleanup;
pub mod diff;
pub mod fragment;
pub mod model;

pub use diff::{diff, diff_with_options};
pub use fragment::{EditKind, Fragment, FragmentNode, build_annotated_fragment};
pub use model::{DiffAlgorithm, DiffOp, DiffOptions, DiffTag, Granularity, new_text, old_text};
