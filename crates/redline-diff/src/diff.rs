use similar::{ChangeTag, TextDiff};

use crate::cleanup::{Run, cleanup_semantic, ops_from_runs, push_change};
use crate::model::{DiffOp, DiffOptions, DiffTag, Granularity};

pub fn diff(old: &str, new: &str) -> Vec<DiffOp> {
    diff_with_options(old, new, DiffOptions::default())
}

/// Computes a classified diff between two short texts.
///
/// The result is deterministic for a given `(old, new, options)` triple and
/// never splits an extended grapheme cluster. Concatenating the `equal` and
/// `delete` texts gives back `old`; `equal` and `insert` give back `new`.
pub fn diff_with_options(old: &str, new: &str, options: DiffOptions) -> Vec<DiffOp> {
    if old == new {
        return vec![DiffOp::equal(old)];
    }
    if old.is_empty() {
        return vec![DiffOp::insert(new)];
    }
    if new.is_empty() {
        return vec![DiffOp::delete(old)];
    }

    let mut config = TextDiff::configure();
    config.algorithm(options.algorithm.into());
    let diff = match options.granularity {
        Granularity::Grapheme => config.diff_graphemes(old, new),
        Granularity::Word => config.diff_unicode_words(old, new),
    };

    let mut runs: Vec<Run> = Vec::new();
    for change in diff.iter_all_changes() {
        let tag = match change.tag() {
            ChangeTag::Equal => DiffTag::Equal,
            ChangeTag::Delete => DiffTag::Delete,
            ChangeTag::Insert => DiffTag::Insert,
        };
        push_change(&mut runs, tag, change.value());
    }

    if options.semantic_cleanup {
        cleanup_semantic(&mut runs);
    }

    let ops = ops_from_runs(runs);
    tracing::trace!(
        old_len = old.len(),
        new_len = new.len(),
        ops = ops.len(),
        "computed text diff"
    );
    ops
}
