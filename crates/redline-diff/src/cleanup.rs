use unicode_segmentation::UnicodeSegmentation;

use crate::model::{DiffOp, DiffTag};

/// A diff collapsed so that equalities and changes alternate. Every change
/// between two equalities is a single run, deletions before insertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Run {
    Equal(String),
    Change { deleted: String, inserted: String },
}

pub(crate) fn push_change(runs: &mut Vec<Run>, tag: DiffTag, text: &str) {
    if text.is_empty() {
        return;
    }

    match (tag, runs.last_mut()) {
        (DiffTag::Equal, Some(Run::Equal(last))) => last.push_str(text),
        (DiffTag::Equal, _) => runs.push(Run::Equal(text.to_string())),
        (DiffTag::Delete, Some(Run::Change { deleted, .. })) => deleted.push_str(text),
        (DiffTag::Insert, Some(Run::Change { inserted, .. })) => inserted.push_str(text),
        (DiffTag::Delete, _) => runs.push(Run::Change {
            deleted: text.to_string(),
            inserted: String::new(),
        }),
        (DiffTag::Insert, _) => runs.push(Run::Change {
            deleted: String::new(),
            inserted: text.to_string(),
        }),
    }
}

fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

fn change_weight(deleted: &str, inserted: &str) -> usize {
    grapheme_len(deleted).max(grapheme_len(inserted))
}

/// Absorbs short equalities sandwiched between two changes. An equality is
/// absorbed when it is no longer than the larger side of the change on each
/// of its flanks, so "c→d, a, t→g" becomes one "cat→dag" replacement instead
/// of three interleaved fragments.
pub(crate) fn cleanup_semantic(runs: &mut Vec<Run>) {
    let mut ix = 1usize;
    while ix + 1 < runs.len() {
        let absorb = match (&runs[ix - 1], &runs[ix], &runs[ix + 1]) {
            (
                Run::Change {
                    deleted: left_deleted,
                    inserted: left_inserted,
                },
                Run::Equal(equal),
                Run::Change {
                    deleted: right_deleted,
                    inserted: right_inserted,
                },
            ) => {
                let len = grapheme_len(equal);
                len <= change_weight(left_deleted, left_inserted)
                    && len <= change_weight(right_deleted, right_inserted)
            }
            _ => false,
        };

        if !absorb {
            ix += 1;
            continue;
        }

        let right = runs.remove(ix + 1);
        let middle = runs.remove(ix);
        if let (
            Run::Equal(equal),
            Run::Change {
                deleted: right_deleted,
                inserted: right_inserted,
            },
            Run::Change { deleted, inserted },
        ) = (middle, right, &mut runs[ix - 1])
        {
            tracing::trace!(equal = %equal, "absorbing short equality into surrounding change");
            deleted.push_str(&equal);
            deleted.push_str(&right_deleted);
            inserted.push_str(&equal);
            inserted.push_str(&right_inserted);
        }

        // The merged change is larger now, so the equality before it may
        // qualify as well.
        ix = if ix >= 3 { ix - 2 } else { 1 };
    }
}

pub(crate) fn ops_from_runs(runs: Vec<Run>) -> Vec<DiffOp> {
    let mut ops = Vec::with_capacity(runs.len() * 2);
    for run in runs {
        match run {
            Run::Equal(text) => ops.push(DiffOp::equal(text)),
            Run::Change { deleted, inserted } => {
                if !deleted.is_empty() {
                    ops.push(DiffOp::delete(deleted));
                }
                if !inserted.is_empty() {
                    ops.push(DiffOp::insert(inserted));
                }
            }
        }
    }
    ops
}
