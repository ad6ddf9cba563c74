use std::collections::HashMap;
use std::ops::Range;

use redline_diff::EditKind;
use serde::{Deserialize, Serialize};

use crate::core::{Document, Node, Selection};
use crate::inline::point_block_offset;
use crate::ops::Path;
use crate::plugin::{PluginRegistry, ordered_selection_points, text_blocks_in_order};

/// A contiguous piece of an edit inside one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSegment {
    pub block_path: Path,
    /// Child indices of the leaves (or the marker) inside the block.
    pub children: Range<usize>,
    /// Global offsets covered inside the block.
    pub range: Range<usize>,
}

impl EditSegment {
    fn start(&self) -> (&[usize], usize) {
        (self.block_path.as_slice(), self.range.start)
    }

    fn end(&self) -> (&[usize], usize) {
        (self.block_path.as_slice(), self.range.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub id: String,
    pub kind: EditKind,
    /// Text before the edit: a span's `old_text` or a marker's deleted text.
    pub old_text: String,
    /// Text the edit currently proposes. Always empty for markers.
    pub new_text: String,
    pub segments: Vec<EditSegment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub add: usize,
    pub replace: usize,
    pub delete: usize,
}

impl SummaryCounts {
    pub fn total(&self) -> usize {
        self.add + self.replace + self.delete
    }

    fn record(&mut self, kind: EditKind) {
        match kind {
            EditKind::Add => self.add += 1,
            EditKind::Replace => self.replace += 1,
            EditKind::Delete => self.delete += 1,
        }
    }
}

/// Pending edits touched by a selection, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectingEdits {
    pub add: Vec<String>,
    pub replace: Vec<String>,
    pub delete: Vec<String>,
    /// All of the above in document order.
    pub ids: Vec<String>,
}

impl IntersectingEdits {
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            add: self.add.len(),
            replace: self.replace.len(),
            delete: self.delete.len(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Every pending edit in a document, keyed by id and kept in document order.
///
/// The registry is a pure function of the document: the editor rebuilds it
/// after each mutation, so ids that were resolved or deleted out of band
/// never linger.
#[derive(Debug, Clone, Default)]
pub struct EditRegistry {
    entries: Vec<EditEntry>,
    index: HashMap<String, usize>,
}

impl EditRegistry {
    pub fn build(doc: &Document, registry: &PluginRegistry) -> Self {
        let mut out = Self::default();

        for block in text_blocks_in_order(doc, registry) {
            let mut cursor = 0usize;
            for (ix, node) in block.el.children.iter().enumerate() {
                match node {
                    Node::Text(t) => {
                        let start = cursor;
                        cursor += t.text.len();
                        let Some(mark) = &t.marks.suggestion else {
                            continue;
                        };
                        out.push_segment(
                            &mark.id,
                            EditKind::for_span(&mark.old_text),
                            &mark.old_text,
                            &t.text,
                            EditSegment {
                                block_path: block.path.clone(),
                                children: ix..ix + 1,
                                range: start..cursor,
                            },
                        );
                    }
                    Node::Void(v) => {
                        let start = cursor;
                        cursor += v.inline_text_len();
                        let Some(marker) = v.as_delete_marker() else {
                            continue;
                        };
                        out.push_segment(
                            marker.id,
                            EditKind::Delete,
                            marker.deleted_text,
                            "",
                            EditSegment {
                                block_path: block.path.clone(),
                                children: ix..ix + 1,
                                range: start..cursor,
                            },
                        );
                    }
                    Node::Element(_) => {}
                }
            }
        }

        tracing::trace!(edits = out.entries.len(), "rebuilt edit registry");
        out
    }

    fn push_segment(
        &mut self,
        id: &str,
        kind: EditKind,
        old_text: &str,
        text: &str,
        segment: EditSegment,
    ) {
        let Some(&ix) = self.index.get(id) else {
            self.index.insert(id.to_string(), self.entries.len());
            self.entries.push(EditEntry {
                id: id.to_string(),
                kind,
                old_text: old_text.to_string(),
                new_text: text.to_string(),
                segments: vec![segment],
            });
            return;
        };

        let entry = &mut self.entries[ix];
        entry.new_text.push_str(text);
        match entry.segments.last_mut() {
            Some(last)
                if last.block_path == segment.block_path
                    && last.children.end == segment.children.start =>
            {
                last.children.end = segment.children.end;
                last.range.end = segment.range.end;
            }
            _ => entry.segments.push(segment),
        }
    }

    pub fn get(&self, id: &str) -> Option<&EditEntry> {
        self.index.get(id).map(|&ix| &self.entries[ix])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn entries(&self) -> &[EditEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> SummaryCounts {
        let mut counts = SummaryCounts::default();
        for entry in &self.entries {
            counts.record(entry.kind);
        }
        counts
    }

    /// Edits touched by `selection`. A range selection picks every edit that
    /// overlaps it. A collapsed selection picks edits whose range contains
    /// the point, boundaries included, so a cursor right at a marker counts.
    pub fn intersecting(&self, doc: &Document, selection: &Selection) -> IntersectingEdits {
        let (start, end) = ordered_selection_points(selection);
        let (Some(start), Some(end)) = (
            point_block_offset(doc, &start),
            point_block_offset(doc, &end),
        ) else {
            return IntersectingEdits::default();
        };
        let sel_start = (start.0.as_slice(), start.1);
        let sel_end = (end.0.as_slice(), end.1);
        let collapsed = sel_start == sel_end;

        let mut out = IntersectingEdits::default();
        for entry in &self.entries {
            let hit = entry.segments.iter().any(|seg| {
                if collapsed {
                    seg.start() <= sel_start && sel_start <= seg.end()
                } else {
                    seg.start() < sel_end && sel_start < seg.end()
                }
            });
            if !hit {
                continue;
            }
            match entry.kind {
                EditKind::Add => out.add.push(entry.id.clone()),
                EditKind::Replace => out.replace.push(entry.id.clone()),
                EditKind::Delete => out.delete.push(entry.id.clone()),
            }
            out.ids.push(entry.id.clone());
        }
        out
    }
}
