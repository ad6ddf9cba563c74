use redline_diff::EditKind;
use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::edit_registry::{EditEntry, EditRegistry, SummaryCounts};
use crate::inline::point_block_offset;
use crate::sidebar::BoxSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Add,
    Replace,
    Delete,
    Summary,
}

impl From<EditKind> for FocusMode {
    fn from(kind: EditKind) -> Self {
        match kind {
            EditKind::Add => FocusMode::Add,
            EditKind::Replace => FocusMode::Replace,
            EditKind::Delete => FocusMode::Delete,
        }
    }
}

/// What the edit menu should show and which edit it is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub mode: FocusMode,
    pub old_text: String,
    pub new_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_counts: Option<SummaryCounts>,
    pub anchor_id: String,
    /// The focused edit, or every edit a summary covers.
    pub edit_ids: Vec<String>,
}

impl FocusState {
    fn single(entry: &EditEntry) -> Self {
        Self {
            mode: entry.kind.into(),
            old_text: entry.old_text.clone(),
            new_text: entry.new_text.clone(),
            summary_counts: None,
            anchor_id: entry.id.clone(),
            edit_ids: vec![entry.id.clone()],
        }
    }
}

/// Decides what the edit menu shows for the current selection, checking in
/// order:
///
/// 1. the selection head sits inside a span: the character just before it
///    (or just after it, at the very start of a block) belongs to the span;
/// 2. the head sits right before a delete marker;
/// 3. a range selection touches one or more edits, giving a summary anchored
///    at the first of them.
///
/// Anything else means no focus.
pub fn compute_focus(editor: &Editor) -> Option<FocusState> {
    let doc = editor.doc();
    let edits = editor.edits();
    let selection = editor.selection();

    if let Some((block_path, offset)) = point_block_offset(doc, &selection.focus) {
        if let Some(entry) = span_at(edits, &block_path, offset) {
            return Some(FocusState::single(entry));
        }
        if let Some(entry) = marker_at(edits, &block_path, offset) {
            return Some(FocusState::single(entry));
        }
    }

    if selection.is_collapsed() {
        return None;
    }

    let hits = edits.intersecting(doc, selection);
    let anchor_id = hits.ids().first()?.clone();
    Some(FocusState {
        mode: FocusMode::Summary,
        old_text: String::new(),
        new_text: String::new(),
        summary_counts: Some(hits.counts()),
        anchor_id,
        edit_ids: hits.ids,
    })
}

fn span_at<'a>(edits: &'a EditRegistry, block_path: &[usize], offset: usize) -> Option<&'a EditEntry> {
    edits
        .entries()
        .iter()
        .filter(|e| e.kind != EditKind::Delete)
        .find(|e| {
            e.segments.iter().any(|seg| {
                seg.block_path == block_path
                    && !seg.range.is_empty()
                    && ((seg.range.start < offset && offset <= seg.range.end)
                        || (offset == 0 && seg.range.start == 0))
            })
        })
}

fn marker_at<'a>(edits: &'a EditRegistry, block_path: &[usize], offset: usize) -> Option<&'a EditEntry> {
    edits
        .entries()
        .iter()
        .filter(|e| e.kind == EditKind::Delete)
        .find(|e| {
            e.segments
                .iter()
                .any(|seg| seg.block_path == block_path && seg.range.start == offset)
        })
}

/// Remembers the focused edit between updates, together with the side its
/// menu was placed on. The side is kept for as long as the same edit stays
/// focused so the menu does not jump while text reflows.
#[derive(Debug, Clone, Default)]
pub struct FocusTracker {
    current: Option<FocusState>,
    side: Option<BoxSide>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, editor: &Editor) -> Option<&FocusState> {
        let next = compute_focus(editor);
        let previous_anchor = self.current.as_ref().map(|f| f.anchor_id.as_str());
        let next_anchor = next.as_ref().map(|f| f.anchor_id.as_str());
        if previous_anchor != next_anchor {
            tracing::trace!(anchor = ?next_anchor, "focused edit changed");
            self.side = None;
        }
        self.current = next;
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&FocusState> {
        self.current.as_ref()
    }

    pub fn side(&self) -> Option<BoxSide> {
        self.side
    }

    /// The remembered side, or the one `choose` picks for a newly focused edit.
    pub fn resolve_side(&mut self, choose: impl FnOnce() -> BoxSide) -> BoxSide {
        *self.side.get_or_insert_with(choose)
    }
}
