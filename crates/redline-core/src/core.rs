use std::collections::{BTreeMap, HashMap};

use redline_diff::DiffOptions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decoration::{Decoration, DecorationSet, decoration_shift};
use crate::edit_registry::EditRegistry;
use crate::error::{ApplyError, PathError};
use crate::inline::{clamp_to_char_boundary, marker_label, original_text, visible_text};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, PluginRegistry, QueryError, node_at_path};
use crate::rewrite::RewriteTicket;

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

pub const PARAGRAPH_KIND: &str = "paragraph";
pub const DELETE_MARKER_KIND: &str = "suggestion_delete";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            children: paragraphs.into_iter().map(Node::paragraph).collect(),
        }
    }

    /// Text as currently shown, blocks joined by `\n`. Delete markers
    /// contribute nothing.
    pub fn plain_text(&self) -> String {
        self.join_blocks(visible_text)
    }

    /// Text as it was before any pending edit was proposed.
    pub fn original_text(&self) -> String {
        self.join_blocks(original_text)
    }

    fn join_blocks(&self, render: fn(&[Node]) -> String) -> String {
        fn walk(nodes: &[Node], render: fn(&[Node]) -> String, out: &mut Vec<String>) {
            for node in nodes {
                let Node::Element(el) = node else {
                    continue;
                };
                if el
                    .children
                    .iter()
                    .any(|n| matches!(n, Node::Text(_) | Node::Void(_)))
                {
                    out.push(render(&el.children));
                } else {
                    walk(&el.children, render, out);
                }
            }
        }

        let mut blocks = Vec::new();
        walk(&self.children, render, &mut blocks);
        blocks.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::paragraph_with(vec![Node::text(text)])
    }

    pub fn paragraph_with(children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: PARAGRAPH_KIND.to_string(),
            attrs: Attrs::default(),
            children,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    /// A text leaf carrying a pending add or replace edit.
    pub fn suggestion(
        id: impl Into<String>,
        old_text: impl Into<String>,
        new_text: impl Into<String>,
    ) -> Self {
        Node::Text(TextNode {
            text: new_text.into(),
            marks: Marks {
                suggestion: Some(SuggestionMark {
                    id: id.into(),
                    old_text: old_text.into(),
                }),
                ..Marks::default()
            },
        })
    }

    pub fn delete_marker(id: impl Into<String>, deleted_text: impl Into<String>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("id".to_string(), Value::String(id.into()));
        attrs.insert(
            "deleted_text".to_string(),
            Value::String(deleted_text.into()),
        );
        Node::Void(VoidNode {
            kind: DELETE_MARKER_KIND.to_string(),
            attrs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

/// Borrowed view of a delete marker's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMarker<'a> {
    pub id: &'a str,
    pub deleted_text: &'a str,
}

impl VoidNode {
    pub fn as_delete_marker(&self) -> Option<DeleteMarker<'_>> {
        if self.kind != DELETE_MARKER_KIND {
            return None;
        }
        let id = self.attrs.get("id")?.as_str()?;
        let deleted_text = self.attrs.get("deleted_text")?.as_str()?;
        Some(DeleteMarker { id, deleted_text })
    }

    pub fn inline_text(&self) -> String {
        match self.as_delete_marker() {
            Some(marker) => marker_label(marker.deleted_text),
            None => "\u{25a1}".to_string(),
        }
    }

    /// Every void occupies exactly one unit of inline offset.
    pub fn inline_text_len(&self) -> usize {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextNode {
    pub fn suggestion_id(&self) -> Option<&str> {
        self.marks.suggestion.as_ref().map(|s| s.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<SuggestionMark>,
}

impl Marks {
    pub fn without_suggestion(&self) -> Marks {
        Marks {
            suggestion: None,
            ..self.clone()
        }
    }
}

/// A pending add or replace edit. `old_text` is empty for pure additions and
/// never changes while the mark exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionMark {
    pub id: String,
    #[serde(default)]
    pub old_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

/// Editor tuning. Zero limits fall back to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub diff: DiffOptions,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

/// Change notifications queued by the editor until the host drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorEvent {
    DocumentChanged,
    SelectionChanged,
    DecorationsChanged,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    edits: EditRegistry,
    events: Vec<EditorEvent>,
    pub(crate) decorations: DecorationSet,
    pub(crate) rewrites: HashMap<String, RewriteTicket>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            registry,
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            edits: EditRegistry::default(),
            events: Vec::new(),
            decorations: DecorationSet::default(),
            rewrites: HashMap::new(),
        };
        editor.normalize_in_place();
        editor.edits = EditRegistry::build(&editor.doc, &editor.registry);
        editor
    }

    pub fn with_core_plugins() -> Self {
        Self::from_paragraphs([""])
    }

    /// An editor over plain paragraphs with the cursor at the start.
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let doc = Document::from_paragraphs(paragraphs);
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(doc, selection, PluginRegistry::core())
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let before = self.selection.clone();
        self.selection = selection;
        self.normalize_selection_in_place();
        if self.selection != before {
            self.notify(EditorEvent::SelectionChanged);
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Index of the pending edits, rebuilt after every document mutation.
    pub fn edits(&self) -> &EditRegistry {
        &self.edits
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub(crate) fn notify(&mut self, event: EditorEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let decorations_before = self.decorations.clone();
        let redo_ops = self.replay(inverse_ops);

        self.selection = selection_before.clone();
        self.normalize_in_place();
        self.after_mutation(true, true, &decorations_before);

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        tracing::debug!(remaining = self.undo_stack.len(), "undo");
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let decorations_before = self.decorations.clone();
        let undo_ops = self.replay(inverse_ops);

        self.selection = selection_after.clone();
        self.normalize_in_place();
        self.after_mutation(true, true, &decorations_before);

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        tracing::debug!(remaining = self.redo_stack.len(), "redo");
        true
    }

    fn replay(&mut self, ops: Vec<Op>) -> Vec<Op> {
        let mut inverse: Vec<Op> = Vec::with_capacity(ops.len());
        for op in ops {
            match self.apply_op(op) {
                Ok(inv) => inverse.push(inv),
                Err(err) => {
                    // Stop mutating once the history no longer matches the document.
                    tracing::warn!(%err, "history replay stopped");
                    break;
                }
            }
        }
        inverse.reverse();
        inverse
    }

    /// Applies a transaction atomically: either every op and the follow-up
    /// normalization succeed, or the document, selection, decorations and
    /// queued events are restored and the error is returned.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        self.apply_remapping(tx, Vec::new())
    }

    /// [`Editor::apply`] for transactions that rebuild whole blocks. Op by op
    /// shifting loses track of decorated ranges in a rebuilt block, so the
    /// caller passes them already carried through the rebuild.
    pub(crate) fn apply_remapping(
        &mut self,
        tx: Transaction,
        remapped: Vec<Decoration>,
    ) -> Result<(), ApplyError> {
        let Transaction {
            ops,
            selection_after,
            meta,
        } = tx;
        let selection_before = self.selection.clone();
        let decorations_before = self.decorations.clone();
        let events_before = self.events.clone();
        let op_count = ops.len();

        let mut inverse_ops: Vec<Op> = Vec::with_capacity(ops.len());
        for op in ops {
            match self.apply_op(op) {
                Ok(inv) => inverse_ops.push(inv),
                Err(err) => {
                    self.rollback(inverse_ops, selection_before, decorations_before, events_before);
                    return Err(err);
                }
            }
        }

        if let Some(sel) = selection_after {
            self.selection = sel;
        }

        if let Err(err) = self.normalize_collecting(&mut inverse_ops) {
            self.rollback(inverse_ops, selection_before, decorations_before, events_before);
            return Err(err);
        }
        inverse_ops.reverse();
        self.decorations.restore(remapped);

        self.normalize_selection_in_place();

        let selection_after = self.selection.clone();
        let doc_changed = !inverse_ops.is_empty();
        let selection_changed = selection_after != selection_before;

        if doc_changed {
            self.undo_stack.push(UndoRecord {
                inverse_ops,
                selection_before,
                selection_after,
            });
            self.redo_stack.clear();
            if self.undo_stack.len() > self.config.max_undo {
                self.undo_stack.remove(0);
            }
        }

        self.after_mutation(doc_changed, selection_changed, &decorations_before);
        tracing::debug!(
            source = meta.source.as_deref().unwrap_or("unknown"),
            ops = op_count,
            "applied transaction"
        );
        Ok(())
    }

    fn rollback(
        &mut self,
        applied: Vec<Op>,
        selection: Selection,
        decorations: DecorationSet,
        events: Vec<EditorEvent>,
    ) {
        for op in applied.into_iter().rev() {
            if let Err(err) = apply_op_to(&mut self.doc, &mut self.selection, op) {
                tracing::warn!(%err, "failed to roll back op");
            }
        }
        self.selection = selection;
        self.decorations = decorations;
        self.events = events;
        tracing::debug!("rolled back failed transaction");
    }

    fn after_mutation(
        &mut self,
        doc_changed: bool,
        selection_changed: bool,
        decorations_before: &DecorationSet,
    ) {
        if doc_changed {
            self.edits = EditRegistry::build(&self.doc, &self.registry);
            self.settle_decorations();
            self.notify(EditorEvent::DocumentChanged);
        }
        if selection_changed {
            self.notify(EditorEvent::SelectionChanged);
        }
        if self.decorations != *decorations_before {
            self.notify(EditorEvent::DecorationsChanged);
        }
    }

    pub fn run_command(
        &mut self,
        id: &str,
        args: Option<serde_json::Value>,
    ) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn normalize_in_place(&mut self) {
        let mut scratch = Vec::new();
        if let Err(err) = self.normalize_collecting(&mut scratch) {
            tracing::warn!(%err, "document normalization failed");
        }
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .registry
            .normalize_selection(&self.doc, &self.selection);
    }

    fn normalize_collecting(&mut self, inverse_ops: &mut Vec<Op>) -> Result<(), ApplyError> {
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc);
            if ops.is_empty() {
                return Ok(());
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.push(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, ApplyError> {
        let shift = decoration_shift(&self.doc, &op);
        let inverse = apply_op_to(&mut self.doc, &mut self.selection, op)?;
        if let Some(shift) = shift {
            self.decorations.shift(&shift);
        }
        Ok(inverse)
    }
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let old = match node {
                Node::Element(el) => patch_apply(&mut el.attrs, &patch),
                Node::Void(v) if v.kind == DELETE_MARKER_KIND => {
                    return Err(ApplyError::PendingEdit(
                        "delete marker attrs cannot be changed".into(),
                    ));
                }
                Node::Void(v) => patch_apply(&mut v.attrs, &patch),
                Node::Text(_) => return Err(ApplyError::InvalidPath("Text has no attrs".into())),
            };
            Ok(Op::SetNodeAttrs { path, patch: old })
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            // Formatting may change, the suggestion mark may not.
            if text_node.marks.suggestion != marks.suggestion {
                return Err(ApplyError::PendingEdit(
                    "suggestion marks cannot be set or changed".into(),
                ));
            }
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
    }
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    let sibling = move |ix: usize| {
        let mut sibling_path = parent_path.to_vec();
        sibling_path.push(ix);
        node_at_path(doc_after_remove, &sibling_path)
    };

    let left = index.checked_sub(1).and_then(|ix| sibling(ix));
    let merge_prefix_len = match (removed, left) {
        (Node::Text(removed_text), Some(Node::Text(left_text)))
            if left_text.marks == removed_text.marks
                && left_text.text.ends_with(&removed_text.text) =>
        {
            Some(left_text.text.len().saturating_sub(removed_text.text.len()))
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        point.path.truncate(depth + 1);
        match (merge_prefix_len, removed, left) {
            (Some(prefix), Node::Text(removed_text), _) => {
                point.path[depth] = index - 1;
                point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
            }
            (None, _, Some(Node::Text(left_text))) => {
                point.path[depth] = index - 1;
                point.offset = left_text.text.len();
            }
            _ if matches!(sibling(index), Some(Node::Text(_))) => {
                point.path[depth] = index;
                point.offset = 0;
            }
            _ => {
                point.path[depth] = index.saturating_sub(1);
                point.offset = 0;
            }
        }
    }
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((&first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Void(_) | Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}
