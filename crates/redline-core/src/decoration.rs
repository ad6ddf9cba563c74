use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{Document, Node};
use crate::inline::{OffsetMap, point_global_offset, total_inline_text_len};
use crate::ops::{Op, Path};
use crate::plugin::{element_at_path, node_at_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecorationKind {
    /// A rewrite for this region is in flight.
    Loading,
}

/// Presentation-only markup over a block region. Decorations live beside the
/// document, so they never enter undo history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub id: String,
    pub kind: DecorationKind,
    pub block_path: Path,
    pub range: Range<usize>,
    pub whole_block: bool,
}

impl Decoration {
    /// Whether two decorations cover any common part of the same block.
    pub fn overlaps(&self, block_path: &[usize], range: &Range<usize>, whole_block: bool) -> bool {
        if self.block_path != block_path {
            return false;
        }
        if self.whole_block || whole_block {
            return true;
        }
        if self.range.is_empty() || range.is_empty() {
            return self.range.start <= range.end && range.start <= self.range.end;
        }
        self.range.start < range.end && range.start < self.range.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecorationSet {
    items: Vec<Decoration>,
}

/// How one op moves decorated regions, worked out against the document as it
/// was before the op ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecorationShift {
    /// A block was inserted at this path.
    BlockInserted(Path),
    /// The block at this path, with everything under it, was removed.
    BlockRemoved(Path),
    /// `removed` units at global offset `at` of a block were replaced by
    /// `inserted` units.
    Inline {
        block_path: Path,
        at: usize,
        removed: usize,
        inserted: usize,
    },
}

pub(crate) fn decoration_shift(doc: &Document, op: &Op) -> Option<DecorationShift> {
    match op {
        Op::InsertText { path, offset, text } => {
            let (block_path, children, child_ix) = inline_parent(doc, path)?;
            Some(DecorationShift::Inline {
                block_path: block_path.to_vec(),
                at: point_global_offset(children, child_ix, *offset),
                removed: 0,
                inserted: text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let (block_path, children, child_ix) = inline_parent(doc, path)?;
            let at = point_global_offset(children, child_ix, range.start);
            let end = point_global_offset(children, child_ix, range.end);
            Some(DecorationShift::Inline {
                block_path: block_path.to_vec(),
                at,
                removed: end.saturating_sub(at),
                inserted: 0,
            })
        }
        Op::InsertNode {
            path,
            node: Node::Element(_),
        } => Some(DecorationShift::BlockInserted(path.clone())),
        Op::InsertNode { path, node } => {
            let (block_path, children, child_ix) = inline_parent(doc, path)?;
            Some(DecorationShift::Inline {
                block_path: block_path.to_vec(),
                at: total_inline_text_len(children.get(..child_ix)?),
                removed: 0,
                inserted: total_inline_text_len(std::slice::from_ref(node)),
            })
        }
        Op::RemoveNode { path } => match node_at_path(doc, path)? {
            Node::Element(_) => Some(DecorationShift::BlockRemoved(path.clone())),
            node => {
                let (block_path, children, child_ix) = inline_parent(doc, path)?;
                Some(DecorationShift::Inline {
                    block_path: block_path.to_vec(),
                    at: point_global_offset(children, child_ix, 0),
                    removed: total_inline_text_len(std::slice::from_ref(node)),
                    inserted: 0,
                })
            }
        },
        Op::SetNodeAttrs { .. } | Op::SetTextMarks { .. } => None,
    }
}

fn inline_parent<'a>(
    doc: &'a Document,
    path: &'a [usize],
) -> Option<(&'a [usize], &'a [Node], usize)> {
    let (&child_ix, block_path) = path.split_last()?;
    let block = element_at_path(doc, block_path)?;
    Some((block_path, &block.children, child_ix))
}

/// Maps a decorated range through an inline change. Text inserted right at
/// the start pushes the range along; text inserted right at its end stays
/// outside it. Removed positions collapse onto `at`.
fn shift_range(range: &Range<usize>, at: usize, removed: usize, inserted: usize) -> Range<usize> {
    let map = |pos: usize, after: bool| {
        if pos < at || (pos == at && !after) {
            pos
        } else if pos >= at + removed {
            pos - removed + inserted
        } else {
            at
        }
    };
    let start = map(range.start, true);
    let end = map(range.end, range.is_empty());
    start..end.max(start)
}

impl DecorationSet {
    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Decoration> {
        self.items.iter().find(|d| d.id == id)
    }

    pub fn find_overlapping(
        &self,
        block_path: &[usize],
        range: &Range<usize>,
        whole_block: bool,
    ) -> Option<&Decoration> {
        self.items
            .iter()
            .find(|d| d.overlaps(block_path, range, whole_block))
    }

    pub(crate) fn add(&mut self, decoration: Decoration) {
        self.items.push(decoration);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Decoration> {
        let ix = self.items.iter().position(|d| d.id == id)?;
        Some(self.items.remove(ix))
    }

    /// Copies of the decorations on `block_path` with their ranges carried
    /// through a rebuild of the block's inline content.
    pub(crate) fn remapped(&self, block_path: &[usize], offsets: &OffsetMap) -> Vec<Decoration> {
        self.items
            .iter()
            .filter(|d| d.block_path == block_path)
            .map(|d| Decoration {
                range: offsets.map_range(&d.range),
                ..d.clone()
            })
            .collect()
    }

    /// Puts back decorations by id. Ids no longer present are skipped.
    pub(crate) fn restore(&mut self, decorations: Vec<Decoration>) {
        for decoration in decorations {
            if let Some(slot) = self.items.iter_mut().find(|d| d.id == decoration.id) {
                *slot = decoration;
            }
        }
    }

    pub(crate) fn set_range(&mut self, id: &str, range: Range<usize>) {
        if let Some(d) = self.items.iter_mut().find(|d| d.id == id) {
            d.range = range;
        }
    }

    /// Follows one applied op. A decoration whose block (or an ancestor of
    /// it) was removed is dropped.
    pub(crate) fn shift(&mut self, shift: &DecorationShift) {
        match shift {
            DecorationShift::BlockInserted(path) => self.shift_blocks(path, true),
            DecorationShift::BlockRemoved(path) => self.shift_blocks(path, false),
            DecorationShift::Inline {
                block_path,
                at,
                removed,
                inserted,
            } => {
                for d in self.items.iter_mut().filter(|d| d.block_path == *block_path) {
                    d.range = shift_range(&d.range, *at, *removed, *inserted);
                }
            }
        }
    }

    fn shift_blocks(&mut self, path: &[usize], inserted: bool) {
        let Some((&index, parent_path)) = path.split_last() else {
            return;
        };
        let depth = parent_path.len();

        self.items.retain_mut(|d| {
            if d.block_path.len() <= depth || !d.block_path.starts_with(parent_path) {
                return true;
            }
            let ix = d.block_path[depth];
            if inserted {
                if ix >= index {
                    d.block_path[depth] += 1;
                }
                return true;
            }
            if ix > index {
                d.block_path[depth] -= 1;
                return true;
            }
            if ix == index {
                tracing::debug!(id = %d.id, "dropping decoration of removed block");
                return false;
            }
            true
        });
    }
}
