//! Inline content of a single block: offsets, splitting and the canonical
//! leaf layout every rebuilt block is reduced to.
//!
//! Positions inside a block are *global offsets*: the byte length of every
//! text leaf before the position plus one unit per void.

use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

use crate::core::{Document, Marks, Node, Point, TextNode};
use crate::ops::Path;
use crate::plugin::element_at_path;

/// Delete marker labels show at most this many grapheme clusters.
pub const MARKER_LABEL_GRAPHEMES: usize = 24;

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub fn marker_label(deleted_text: &str) -> String {
    let mut graphemes = deleted_text.graphemes(true);
    let label: String = graphemes.by_ref().take(MARKER_LABEL_GRAPHEMES).collect();
    if graphemes.next().is_some() {
        format!("{label}\u{2026}")
    } else {
        label
    }
}

pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if ix < child_ix {
                    global += t.text.len();
                    continue;
                }
                if ix == child_ix {
                    global += clamp_to_char_boundary(&t.text, offset);
                }
                break;
            }
            Node::Void(v) => {
                if ix < child_ix {
                    global += v.inline_text_len();
                    continue;
                }
                if ix == child_ix {
                    global += offset.min(v.inline_text_len());
                }
                break;
            }
            Node::Element(_) => {}
        }
    }
    global
}

/// Maps a global offset back onto a text leaf. At a boundary between two
/// text leaves the point lands at the start of the right one.
pub(crate) fn point_for_global_offset(
    block_path: &[usize],
    children: &[Node],
    global_offset: usize,
) -> Point {
    let leaf = |ix: usize, offset: usize| {
        let mut path = block_path.to_vec();
        path.push(ix);
        Point::new(path, offset)
    };

    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if remaining < t.text.len() {
                    return leaf(child_ix, clamp_to_char_boundary(&t.text, remaining));
                }
                if remaining == t.text.len() {
                    if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                        return leaf(child_ix + 1, 0);
                    }
                    return leaf(child_ix, t.text.len());
                }
                remaining -= t.text.len();
            }
            Node::Void(v) => {
                let len = v.inline_text_len();
                if remaining <= len {
                    if remaining == 0 {
                        if let Some((ix, Node::Text(t))) = children
                            .iter()
                            .enumerate()
                            .take(child_ix)
                            .rev()
                            .find(|(_, n)| matches!(n, Node::Text(_)))
                        {
                            return leaf(ix, t.text.len());
                        }
                    }
                    if let Some((ix, _)) = children
                        .iter()
                        .enumerate()
                        .skip(child_ix + 1)
                        .find(|(_, n)| matches!(n, Node::Text(_)))
                    {
                        return leaf(ix, 0);
                    }
                    break;
                }
                remaining -= len;
            }
            Node::Element(_) => {}
        }
    }

    // Fall back to the end of the last text leaf.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            return leaf(child_ix, t.text.len());
        }
    }
    leaf(0, 0)
}

pub(crate) fn total_inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Void(v) => v.inline_text_len(),
            Node::Element(_) => 0,
        })
        .sum()
}

/// Block path and global offset of a point that addresses an inline leaf.
pub(crate) fn point_block_offset(doc: &Document, point: &Point) -> Option<(Path, usize)> {
    let (&child_ix, block_path) = point.path.split_last()?;
    let block = element_at_path(doc, block_path)?;
    block.children.get(child_ix)?;
    Some((
        block_path.to_vec(),
        point_global_offset(&block.children, child_ix, point.offset),
    ))
}

/// Text currently shown: plain and suggested text, markers excluded.
pub fn visible_text(children: &[Node]) -> String {
    children
        .iter()
        .filter_map(|n| match n {
            Node::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}

/// Text as it was before the pending edits: each span contributes its
/// `old_text` once and each marker its deleted text.
pub fn original_text(children: &[Node]) -> String {
    let mut out = String::new();
    let mut previous_span: Option<&str> = None;
    for node in children {
        match node {
            Node::Text(t) => match &t.marks.suggestion {
                Some(mark) => {
                    if previous_span != Some(mark.id.as_str()) {
                        out.push_str(&mark.old_text);
                    }
                    previous_span = Some(mark.id.as_str());
                }
                None => {
                    out.push_str(&t.text);
                    previous_span = None;
                }
            },
            Node::Void(v) => {
                if let Some(marker) = v.as_delete_marker() {
                    out.push_str(marker.deleted_text);
                }
                previous_span = None;
            }
            Node::Element(_) => previous_span = None,
        }
    }
    out
}

/// Splits inline content at a global offset. A text leaf straddling the
/// offset is cut in two, voids stay whole.
pub(crate) fn split_inlines_at(children: &[Node], global: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        match node {
            Node::Text(t) => {
                let start = cursor;
                let end = cursor + t.text.len();
                cursor = end;
                if end <= global {
                    left.push(node.clone());
                } else if start >= global {
                    right.push(node.clone());
                } else {
                    let at = clamp_to_char_boundary(&t.text, global - start);
                    left.push(Node::Text(TextNode {
                        text: t.text[..at].to_string(),
                        marks: t.marks.clone(),
                    }));
                    right.push(Node::Text(TextNode {
                        text: t.text[at..].to_string(),
                        marks: t.marks.clone(),
                    }));
                }
            }
            Node::Void(v) => {
                if cursor < global {
                    left.push(node.clone());
                } else {
                    right.push(node.clone());
                }
                cursor += v.inline_text_len();
            }
            Node::Element(_) => {
                if cursor < global {
                    left.push(node.clone());
                } else {
                    right.push(node.clone());
                }
            }
        }
    }

    (left, right)
}

/// Formatting of the text at `global`, without any suggestion mark.
pub(crate) fn base_marks_at(children: &[Node], global: usize) -> Marks {
    let mut cursor = 0usize;
    let mut before: Option<&Marks> = None;
    for node in children {
        match node {
            Node::Text(t) => {
                let end = cursor + t.text.len();
                if cursor <= global && global < end {
                    return t.marks.without_suggestion();
                }
                if end == global {
                    before = Some(&t.marks);
                }
                cursor = end;
            }
            Node::Void(v) => cursor += v.inline_text_len(),
            Node::Element(_) => {}
        }
    }
    before.map(Marks::without_suggestion).unwrap_or_default()
}

/// Maximal runs of adjacent unmarked text leaves, as `(global start, text)`.
/// Inside a run, byte offsets and global offsets coincide.
pub(crate) fn plain_runs(children: &[Node]) -> Vec<(usize, String)> {
    let mut runs: Vec<(usize, String)> = Vec::new();
    let mut cursor = 0usize;
    let mut open = false;
    for node in children {
        match node {
            Node::Text(t) if t.marks.suggestion.is_none() => {
                match runs.last_mut() {
                    Some((_, text)) if open => text.push_str(&t.text),
                    _ => runs.push((cursor, t.text.clone())),
                }
                open = true;
                cursor += t.text.len();
            }
            Node::Text(t) => {
                open = false;
                cursor += t.text.len();
            }
            Node::Void(v) => {
                open = false;
                cursor += v.inline_text_len();
            }
            Node::Element(_) => open = false,
        }
    }
    runs
}

/// How global offsets of one block move when its inline content is rebuilt
/// piece by piece. Kept pieces map linearly; a replaced piece collapses onto
/// its new edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OffsetMap {
    pieces: Vec<OffsetPiece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OffsetPiece {
    old_len: usize,
    new_len: usize,
    kept: bool,
}

impl OffsetMap {
    pub(crate) fn keep(&mut self, len: usize) {
        self.pieces.push(OffsetPiece {
            old_len: len,
            new_len: len,
            kept: true,
        });
    }

    pub(crate) fn replace(&mut self, old_len: usize, new_len: usize) {
        self.pieces.push(OffsetPiece {
            old_len,
            new_len,
            kept: false,
        });
    }

    pub(crate) fn map(&self, global: usize) -> usize {
        let mut old_start = 0usize;
        let mut new_start = 0usize;
        for piece in &self.pieces {
            let old_end = old_start + piece.old_len;
            if global <= old_end {
                return if piece.kept {
                    new_start + (global - old_start)
                } else if global == old_start {
                    new_start
                } else {
                    new_start + piece.new_len
                };
            }
            old_start = old_end;
            new_start += piece.new_len;
        }
        new_start + (global - old_start)
    }

    pub(crate) fn map_range(&self, range: &Range<usize>) -> Range<usize> {
        let start = self.map(range.start);
        start..self.map(range.end).max(start)
    }
}

/// Reduces inline content to its canonical layout without moving any global
/// offset:
///
/// - empty suggestion leaves are dropped, and so are empty leaves followed by
///   another text leaf;
/// - adjacent leaves with equal marks are merged;
/// - every void gets a text leaf on both sides;
/// - a trailing suggestion leaf gets an empty unmarked leaf after it;
/// - the result always holds at least one text leaf.
pub fn canonicalize_inlines(children: Vec<Node>) -> Vec<Node> {
    let kept: Vec<Node> = children
        .into_iter()
        .filter(|n| !matches!(n, Node::Text(t) if t.text.is_empty() && t.marks.suggestion.is_some()))
        .collect();

    let mut merged: Vec<Node> = Vec::with_capacity(kept.len());
    for (ix, node) in kept.iter().enumerate() {
        if let Node::Text(t) = node
            && t.text.is_empty()
            && matches!(kept.get(ix + 1), Some(Node::Text(_)))
        {
            continue;
        }
        if let (Some(Node::Text(last)), Node::Text(t)) = (merged.last_mut(), node)
            && last.marks == t.marks
        {
            last.text.push_str(&t.text);
            continue;
        }
        merged.push(node.clone());
    }

    let mut out: Vec<Node> = Vec::with_capacity(merged.len() + 2);
    for node in merged {
        if matches!(node, Node::Void(_)) && !matches!(out.last(), Some(Node::Text(_))) {
            out.push(Node::text(""));
        }
        out.push(node);
    }
    match out.last() {
        Some(Node::Void(_)) | None => out.push(Node::text("")),
        Some(Node::Text(t)) if t.marks.suggestion.is_some() => out.push(Node::text("")),
        _ => {}
    }
    out
}
