//! Turning a model rewrite into pending edits.
//!
//! A rewrite is split around the host's model call: [`Editor::begin_rewrite`]
//! snapshots the target and marks it as loading, the host fetches the new
//! text, and [`Editor::complete_rewrite`] diffs it against the snapshot and
//! splices the result in as suggestions. The document may change in between.

use std::borrow::Cow;
use std::ops::Range;

use redline_diff::{DiffOptions, Fragment, FragmentNode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Editor, EditorEvent, Marks, Node, Selection, SuggestionMark, TextNode};
use crate::decoration::{Decoration, DecorationKind};
use crate::error::EditError;
use crate::inline::{
    OffsetMap, base_marks_at, canonicalize_inlines, plain_runs, point_block_offset,
    point_for_global_offset, split_inlines_at, total_inline_text_len,
};
use crate::ops::{Path, Transaction, replace_block_children_ops};
use crate::plugin::element_at_path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionMode {
    /// The selected text, or the whole paragraph for a collapsed selection.
    #[default]
    Selection,
    Paragraph,
}

/// A prompt as stored by the prompt library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSpec {
    pub prompt_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_parsing_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_parsing_replacement: Option<String>,
    pub injection_mode: InjectionMode,
}

impl PromptSpec {
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            ..Self::default()
        }
    }

    pub fn output_parser(&self) -> OutputParser {
        OutputParser::new(
            self.output_parsing_pattern.as_deref(),
            self.output_parsing_replacement.as_deref(),
        )
    }
}

const DEFAULT_PATTERN: &str = "(?s).*";
const DEFAULT_REPLACEMENT: &str = "$0";

/// Extracts the useful part of raw model output.
#[derive(Debug, Clone)]
pub struct OutputParser {
    pattern: Option<Regex>,
    replacement: String,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl OutputParser {
    /// A pattern that fails to compile disables parsing instead of failing
    /// the rewrite.
    pub fn new(pattern: Option<&str>, replacement: Option<&str>) -> Self {
        let source = pattern.unwrap_or(DEFAULT_PATTERN);
        let pattern = match Regex::new(source) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = source, %err, "output pattern does not compile, using raw output");
                None
            }
        };
        Self {
            pattern,
            replacement: replacement.unwrap_or(DEFAULT_REPLACEMENT).to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pattern.is_some()
    }

    /// The replacement expanded against the first match, or `raw` unchanged
    /// when nothing matches.
    pub fn parse<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let Some(pattern) = &self.pattern else {
            return Cow::Borrowed(raw);
        };
        let Some(captures) = pattern.captures(raw) else {
            return Cow::Borrowed(raw);
        };
        let mut out = String::new();
        captures.expand(&self.replacement, &mut out);
        Cow::Owned(out)
    }
}

/// A failed model call, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Snapshot of a rewrite target taken when the request was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteTicket {
    pub id: String,
    pub block_path: Path,
    pub range: Range<usize>,
    pub old_text: String,
    pub whole_block: bool,
    pub prompt: PromptSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteApplied {
    pub ticket_id: String,
    /// Ids of the new pending edits in document order. Empty when the
    /// output matched the target.
    pub edit_ids: Vec<String>,
    pub fragment: Fragment,
}

/// Parses raw model output and diffs it against the target text.
pub fn plan_rewrite(old: &str, raw: &str, parser: &OutputParser, options: DiffOptions) -> Fragment {
    let new = parser.parse(raw);
    let ops = redline_diff::diff_with_options(old, &new, options);
    redline_diff::build_annotated_fragment(&ops)
}

impl Editor {
    /// Snapshots the rewrite target for `prompt` and marks it as loading.
    ///
    /// The target has to sit inside one block and must not contain pending
    /// edits or another rewrite in flight.
    pub fn begin_rewrite(&mut self, prompt: PromptSpec) -> Result<RewriteTicket, EditError> {
        let selection = self.selection().clone();
        let (anchor_block, anchor) = point_block_offset(self.doc(), &selection.anchor)
            .ok_or_else(|| EditError::invalid_input("selection does not address inline text"))?;
        let (focus_block, focus) = point_block_offset(self.doc(), &selection.focus)
            .ok_or_else(|| EditError::invalid_input("selection does not address inline text"))?;
        if anchor_block != focus_block {
            return Err(EditError::invalid_input(
                "rewrite target must not span several blocks",
            ));
        }
        let block_path = focus_block;
        let Some(block) = element_at_path(self.doc(), &block_path) else {
            return Err(EditError::invalid_input("selection does not address a block"));
        };

        let whole_block = prompt.injection_mode == InjectionMode::Paragraph || anchor == focus;
        let range = if whole_block {
            0..total_inline_text_len(&block.children)
        } else {
            anchor.min(focus)..anchor.max(focus)
        };

        let old_text = plain_runs(&block.children)
            .into_iter()
            .find_map(|(start, text)| run_slice(start, &text, &range).map(str::to_string))
            .ok_or_else(|| EditError::invalid_input("rewrite target contains pending edits"))?;

        if let Some(existing) = self
            .decorations
            .find_overlapping(&block_path, &range, whole_block)
        {
            return Err(EditError::invalid_input(format!(
                "rewrite target overlaps rewrite {}",
                existing.id
            )));
        }

        let ticket = RewriteTicket {
            id: uuid::Uuid::new_v4().to_string(),
            block_path: block_path.clone(),
            range: range.clone(),
            old_text,
            whole_block,
            prompt,
        };
        self.decorations.add(Decoration {
            id: ticket.id.clone(),
            kind: DecorationKind::Loading,
            block_path,
            range,
            whole_block,
        });
        self.rewrites.insert(ticket.id.clone(), ticket.clone());
        self.notify(EditorEvent::DecorationsChanged);

        tracing::debug!(
            id = %ticket.id,
            block = ?ticket.block_path,
            range = ?ticket.range,
            "rewrite started"
        );
        Ok(ticket)
    }

    /// Finishes a rewrite with the host's model result.
    ///
    /// The loading decoration is cleared whatever the outcome. On success the
    /// parsed output is spliced in as pending edits in one undoable
    /// transaction and the cursor lands right after them. Nothing is mutated
    /// on failure.
    pub fn complete_rewrite(
        &mut self,
        ticket_id: &str,
        result: Result<String, UpstreamError>,
    ) -> Result<RewriteApplied, EditError> {
        let decoration = self.decorations.remove(ticket_id);
        if decoration.is_some() {
            self.notify(EditorEvent::DecorationsChanged);
        }
        let Some(ticket) = self.rewrites.remove(ticket_id) else {
            tracing::warn!(id = ticket_id, "unknown or finished rewrite");
            return Err(EditError::StaleTarget);
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(id = ticket_id, %err, "rewrite request failed");
                return Err(EditError::Upstream {
                    message: err.message,
                });
            }
        };

        // The decoration followed every edit since the snapshot; without it
        // the block is gone.
        let Some(Decoration {
            block_path,
            range: tracked,
            ..
        }) = decoration
        else {
            tracing::warn!(id = ticket_id, "rewrite target block was removed");
            return Err(EditError::StaleTarget);
        };
        let Some(block) = element_at_path(self.doc(), &block_path) else {
            tracing::warn!(id = ticket_id, "rewrite target block was removed");
            return Err(EditError::StaleTarget);
        };
        let Some(range) = locate_target(&block.children, &tracked, &ticket.old_text) else {
            tracing::warn!(id = ticket_id, "rewrite target text changed");
            return Err(EditError::StaleTarget);
        };

        let parser = ticket.prompt.output_parser();
        let fragment = plan_rewrite(&ticket.old_text, &raw, &parser, self.config().diff);
        if !fragment.has_edits() {
            tracing::debug!(id = ticket_id, "rewrite produced no edits");
            return Ok(RewriteApplied {
                ticket_id: ticket.id,
                edit_ids: Vec::new(),
                fragment,
            });
        }

        let base = base_marks_at(&block.children, range.start);
        let (inserted, edit_ids) = fragment_nodes(&fragment, &base);
        let inserted_len = total_inline_text_len(&inserted);

        let (left, _) = split_inlines_at(&block.children, range.start);
        let (_, right) = split_inlines_at(&block.children, range.end);
        let old_len = block.children.len();
        let total = total_inline_text_len(&block.children);
        let children = canonicalize_inlines(left.into_iter().chain(inserted).chain(right).collect());
        let cursor = point_for_global_offset(&block_path, &children, range.start + inserted_len);

        // Other rewrites in flight in this block sit outside the target.
        let mut offsets = OffsetMap::default();
        offsets.keep(range.start);
        offsets.replace(range.len(), inserted_len);
        offsets.keep(total - range.end);
        let remapped = self.decorations.remapped(&block_path, &offsets);

        let ops = replace_block_children_ops(&block_path, old_len, children);
        self.apply_remapping(
            Transaction::new(ops)
                .source("rewrite")
                .selection_after(Selection::collapsed(cursor)),
            remapped,
        )?;

        tracing::debug!(id = ticket_id, edits = edit_ids.len(), "rewrite applied");
        Ok(RewriteApplied {
            ticket_id: ticket.id,
            edit_ids,
            fragment,
        })
    }

    /// Drops a rewrite without touching the document.
    pub fn cancel_rewrite(&mut self, ticket_id: &str) -> bool {
        if self.decorations.remove(ticket_id).is_some() {
            self.notify(EditorEvent::DecorationsChanged);
        }
        self.rewrites.remove(ticket_id).is_some()
    }

    pub fn pending_rewrites(&self) -> impl Iterator<Item = &RewriteTicket> {
        self.rewrites.values()
    }

    /// Moves a loading decoration back onto its target when the snapshot
    /// text is no longer under it but occurs exactly once in the block.
    pub(crate) fn settle_decorations(&mut self) {
        let mut moved = Vec::new();
        for ticket in self.rewrites.values() {
            let Some(decoration) = self.decorations.get(&ticket.id) else {
                continue;
            };
            let Some(block) = element_at_path(self.doc(), &decoration.block_path) else {
                continue;
            };
            if let Some(range) = locate_target(&block.children, &decoration.range, &ticket.old_text)
                && range != decoration.range
            {
                moved.push((ticket.id.clone(), range));
            }
        }
        for (id, range) in moved {
            tracing::debug!(%id, ?range, "loading decoration re-anchored");
            self.decorations.set_range(&id, range);
        }
    }
}

/// `range` cut out of a plain run starting at `start`, if the run holds it.
fn run_slice<'a>(start: usize, text: &'a str, range: &Range<usize>) -> Option<&'a str> {
    if range.start < start || range.end > start + text.len() {
        return None;
    }
    text.get(range.start - start..range.end - start)
}

/// Where the snapshot text is now: at the tracked range if it is still
/// there, else at its only occurrence in the block's plain text.
fn locate_target(
    children: &[Node],
    tracked: &Range<usize>,
    old_text: &str,
) -> Option<Range<usize>> {
    let runs = plain_runs(children);
    let at_tracked = runs
        .iter()
        .any(|(start, text)| run_slice(*start, text, tracked) == Some(old_text));
    if at_tracked {
        return Some(tracked.clone());
    }
    if old_text.is_empty() {
        return None;
    }

    let mut found = runs.iter().flat_map(|(start, text)| {
        text.match_indices(old_text).map(move |(ix, _)| start + ix)
    });
    let first = found.next()?;
    if found.next().is_some() {
        return None;
    }
    Some(first..first + old_text.len())
}

/// Document nodes for a fragment, with a fresh id per edit.
fn fragment_nodes(fragment: &Fragment, base: &Marks) -> (Vec<Node>, Vec<String>) {
    let mut nodes = Vec::with_capacity(fragment.nodes.len());
    let mut ids = Vec::new();
    for node in &fragment.nodes {
        match node {
            FragmentNode::Text { text } => nodes.push(Node::Text(TextNode {
                text: text.clone(),
                marks: base.clone(),
            })),
            FragmentNode::Span { old_text, new_text } => {
                let id = uuid::Uuid::new_v4().to_string();
                nodes.push(Node::Text(TextNode {
                    text: new_text.clone(),
                    marks: Marks {
                        suggestion: Some(SuggestionMark {
                            id: id.clone(),
                            old_text: old_text.clone(),
                        }),
                        ..base.clone()
                    },
                }));
                ids.push(id);
            }
            FragmentNode::DeleteMarker { deleted_text } => {
                let id = uuid::Uuid::new_v4().to_string();
                nodes.push(Node::delete_marker(id.clone(), deleted_text.clone()));
                ids.push(id);
            }
            FragmentNode::Placeholder => nodes.push(Node::Text(TextNode {
                text: String::new(),
                marks: base.clone(),
            })),
        }
    }
    (nodes, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parser_passes_output_through() {
        let parser = OutputParser::default();
        assert!(parser.is_active());
        assert_eq!(parser.parse("multi\nline output"), "multi\nline output");
    }

    #[test]
    fn parser_expands_capture_groups() {
        let parser = OutputParser::new(Some(r"(?s)<answer>(.*?)</answer>"), Some("$1"));
        assert_eq!(
            parser.parse("thinking...<answer>The dog sat.</answer>"),
            "The dog sat."
        );
        assert_eq!(parser.parse("no tags here"), "no tags here");
    }

    #[test]
    fn broken_pattern_falls_back_to_raw_output() {
        let parser = OutputParser::new(Some("(unclosed"), Some("$1"));
        assert!(!parser.is_active());
        assert_eq!(parser.parse("raw"), "raw");
    }

    #[test]
    fn target_is_found_again_after_it_moved() {
        let children = vec![Node::text("A cat")];
        assert_eq!(locate_target(&children, &(0..3), "cat"), Some(2..5));

        let ambiguous = vec![Node::text("a cat, a cat")];
        assert_eq!(locate_target(&ambiguous, &(0..3), "cat"), None);
        assert_eq!(locate_target(&ambiguous, &(9..12), "cat"), Some(9..12));
    }

    #[test]
    fn fragment_nodes_get_distinct_ids() {
        let fragment = Fragment {
            nodes: vec![
                FragmentNode::Text {
                    text: "The ".to_string(),
                },
                FragmentNode::Span {
                    old_text: "cat".to_string(),
                    new_text: "dog".to_string(),
                },
                FragmentNode::DeleteMarker {
                    deleted_text: " sat".to_string(),
                },
            ],
        };
        let (nodes, ids) = fragment_nodes(&fragment, &Marks::default());
        assert_eq!(nodes.len(), 3);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(matches!(&nodes[2], Node::Void(v) if v.as_delete_marker().is_some_and(|m| m.id == ids[1])));
    }
}
