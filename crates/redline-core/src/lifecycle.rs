use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::{Editor, Marks, Node, Point, Selection, TextNode};
use crate::error::EditError;
use crate::inline::{OffsetMap, canonicalize_inlines, point_for_global_offset};
use crate::ops::{Path, Transaction, replace_block_children_ops};
use crate::plugin::element_at_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the proposed text.
    Accept,
    /// Restore the text from before the edit.
    Reject,
}

impl Resolution {
    fn source(self) -> &'static str {
        match self {
            Resolution::Accept => "suggestion:accept",
            Resolution::Reject => "suggestion:reject",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub resolved: Vec<String>,
    /// Requested ids that were no longer pending.
    pub missing: Vec<String>,
}

impl Editor {
    pub fn accept_edit(&mut self, id: &str) -> Result<(), EditError> {
        self.resolve_edit(id, Resolution::Accept)
    }

    pub fn reject_edit(&mut self, id: &str) -> Result<(), EditError> {
        self.resolve_edit(id, Resolution::Reject)
    }

    /// Resolves one pending edit as a single undoable transaction. A stale id
    /// is reported as [`EditError::EditNotFound`] and changes nothing.
    pub fn resolve_edit(&mut self, id: &str, resolution: Resolution) -> Result<(), EditError> {
        if !self.edits().contains(id) {
            tracing::warn!(id, ?resolution, "edit not found");
            return Err(EditError::not_found(id));
        }
        self.resolve_all(&[id], resolution).map(|_| ())
    }

    pub fn accept_all<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<BulkOutcome, EditError> {
        self.resolve_all(ids, Resolution::Accept)
    }

    pub fn reject_all<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<BulkOutcome, EditError> {
        self.resolve_all(ids, Resolution::Reject)
    }

    pub fn accept_all_pending(&mut self) -> Result<BulkOutcome, EditError> {
        let ids = self.edits().ids();
        self.resolve_all(&ids, Resolution::Accept)
    }

    pub fn reject_all_pending(&mut self) -> Result<BulkOutcome, EditError> {
        let ids = self.edits().ids();
        self.resolve_all(&ids, Resolution::Reject)
    }

    /// Accepts every edit the current selection touches.
    pub fn accept_in_selection(&mut self) -> Result<BulkOutcome, EditError> {
        self.resolve_in_selection(Resolution::Accept)
    }

    pub fn reject_in_selection(&mut self) -> Result<BulkOutcome, EditError> {
        self.resolve_in_selection(Resolution::Reject)
    }

    fn resolve_in_selection(&mut self, resolution: Resolution) -> Result<BulkOutcome, EditError> {
        let hits = self.edits().intersecting(self.doc(), self.selection());
        self.resolve_all(hits.ids(), resolution)
    }

    /// Resolves a batch of edits in one transaction, so one undo reverts the
    /// whole batch. Ids that are no longer pending are skipped and reported.
    /// The cursor lands after the last resolved edit in document order.
    pub fn resolve_all<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        resolution: Resolution,
    ) -> Result<BulkOutcome, EditError> {
        if ids.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut outcome = BulkOutcome::default();
        let mut targets: HashSet<String> = HashSet::new();
        let mut blocks: BTreeSet<Path> = BTreeSet::new();
        for id in ids {
            let id = id.as_ref();
            if targets.contains(id) || outcome.missing.iter().any(|m| m == id) {
                continue;
            }
            match self.edits().get(id) {
                Some(entry) => {
                    blocks.extend(entry.segments.iter().map(|s| s.block_path.clone()));
                    targets.insert(id.to_string());
                    outcome.resolved.push(id.to_string());
                }
                None => outcome.missing.push(id.to_string()),
            }
        }

        if outcome.resolved.is_empty() {
            tracing::warn!(ids = ?outcome.missing, ?resolution, "no pending edit matched");
            return Err(EditError::not_found(outcome.missing.join(", ")));
        }
        if !outcome.missing.is_empty() {
            tracing::warn!(ids = ?outcome.missing, "skipping edits that are no longer pending");
        }

        let mut restored: HashSet<String> = HashSet::new();
        let mut ops = Vec::new();
        let mut remapped = Vec::new();
        let mut cursor: Option<Point> = None;
        for block_path in &blocks {
            let Some(block) = element_at_path(self.doc(), block_path) else {
                continue;
            };
            let (children, resolved_at, offsets) =
                resolve_in_block(&block.children, &targets, resolution, &mut restored);
            remapped.extend(self.decorations.remapped(block_path, &offsets));
            let children = canonicalize_inlines(children);
            if let Some(global) = resolved_at {
                cursor = Some(point_for_global_offset(block_path, &children, global));
            }
            ops.extend(replace_block_children_ops(
                block_path,
                block.children.len(),
                children,
            ));
        }

        let mut tx = Transaction::new(ops).source(resolution.source());
        if let Some(point) = cursor {
            tx = tx.selection_after(Selection::collapsed(point));
        }
        self.apply_remapping(tx, remapped)?;

        tracing::debug!(
            ?resolution,
            resolved = outcome.resolved.len(),
            "resolved pending edits"
        );
        Ok(outcome)
    }
}

/// Rewrites one block's inline content with the targeted edits resolved.
/// Returns the new children, the global offset right after the last
/// resolved edit and how every other offset moved.
///
/// A rejected span restores its `old_text` once, at its first leaf; later
/// leaves of the same span (in this block or a later one) are dropped.
fn resolve_in_block(
    children: &[Node],
    targets: &HashSet<String>,
    resolution: Resolution,
    restored: &mut HashSet<String>,
) -> (Vec<Node>, Option<usize>, OffsetMap) {
    let mut out: Vec<Node> = Vec::with_capacity(children.len());
    let mut offsets = OffsetMap::default();
    let mut cursor = 0usize;
    let mut resolved_at = None;

    for node in children {
        match node {
            Node::Text(t) => {
                if let Some(mark) = &t.marks.suggestion
                    && targets.contains(&mark.id)
                {
                    let text = match resolution {
                        Resolution::Accept => Some(t.text.clone()),
                        Resolution::Reject => restored
                            .insert(mark.id.clone())
                            .then(|| mark.old_text.clone()),
                    };
                    let new_len = text.as_ref().map_or(0, String::len);
                    offsets.replace(t.text.len(), new_len);
                    if let Some(text) = text {
                        cursor += text.len();
                        out.push(Node::Text(TextNode {
                            text,
                            marks: t.marks.without_suggestion(),
                        }));
                    }
                    resolved_at = Some(cursor);
                    continue;
                }
                offsets.keep(t.text.len());
                cursor += t.text.len();
                out.push(node.clone());
            }
            Node::Void(v) => {
                if let Some(marker) = v.as_delete_marker()
                    && targets.contains(marker.id)
                {
                    if resolution == Resolution::Reject {
                        let marks = match out.last() {
                            Some(Node::Text(left)) => left.marks.without_suggestion(),
                            _ => Marks::default(),
                        };
                        offsets.replace(v.inline_text_len(), marker.deleted_text.len());
                        cursor += marker.deleted_text.len();
                        out.push(Node::Text(TextNode {
                            text: marker.deleted_text.to_string(),
                            marks,
                        }));
                    } else {
                        offsets.replace(v.inline_text_len(), 0);
                    }
                    resolved_at = Some(cursor);
                    continue;
                }
                offsets.keep(v.inline_text_len());
                cursor += v.inline_text_len();
                out.push(node.clone());
            }
            Node::Element(_) => out.push(node.clone()),
        }
    }

    (out, resolved_at, offsets)
}
