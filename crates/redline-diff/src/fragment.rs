use serde::{Deserialize, Serialize};

use crate::model::{DiffOp, DiffTag};

/// Classification of a pending edit. Spans are `Add` or `Replace`, markers
/// are always `Delete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Add,
    Replace,
    Delete,
}

impl EditKind {
    pub fn for_span(old_text: &str) -> Self {
        if old_text.is_empty() {
            EditKind::Add
        } else {
            EditKind::Replace
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FragmentNode {
    Text { text: String },
    Span { old_text: String, new_text: String },
    DeleteMarker { deleted_text: String },
    /// Zero-width slot that keeps a cursor position after a trailing span.
    Placeholder,
}

impl FragmentNode {
    pub fn edit_kind(&self) -> Option<EditKind> {
        match self {
            FragmentNode::Span { old_text, .. } => Some(EditKind::for_span(old_text)),
            FragmentNode::DeleteMarker { .. } => Some(EditKind::Delete),
            FragmentNode::Text { .. } | FragmentNode::Placeholder => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub nodes: Vec<FragmentNode>,
}

impl Fragment {
    pub fn edit_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.edit_kind().is_some())
            .count()
    }

    pub fn has_edits(&self) -> bool {
        self.edit_count() > 0
    }

    pub fn old_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                FragmentNode::Text { text } => out.push_str(text),
                FragmentNode::Span { old_text, .. } => out.push_str(old_text),
                FragmentNode::DeleteMarker { deleted_text } => out.push_str(deleted_text),
                FragmentNode::Placeholder => {}
            }
        }
        out
    }

    pub fn new_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                FragmentNode::Text { text } => out.push_str(text),
                FragmentNode::Span { new_text, .. } => out.push_str(new_text),
                FragmentNode::DeleteMarker { .. } | FragmentNode::Placeholder => {}
            }
        }
        out
    }
}

/// Turns a diff into the inline shape that gets spliced into a document.
///
/// A `delete` directly followed by an `insert` becomes one replace span, a
/// lone `delete` becomes a marker and a lone `insert` becomes an add span.
pub fn build_annotated_fragment(ops: &[DiffOp]) -> Fragment {
    let ops = coalesce(ops);
    let mut nodes = Vec::with_capacity(ops.len() + 1);

    let mut ix = 0usize;
    while ix < ops.len() {
        let op = &ops[ix];
        match op.tag {
            DiffTag::Equal => {
                nodes.push(FragmentNode::Text {
                    text: op.text.clone(),
                });
                ix += 1;
            }
            DiffTag::Delete => {
                if let Some(next) = ops.get(ix + 1)
                    && next.tag == DiffTag::Insert
                {
                    nodes.push(FragmentNode::Span {
                        old_text: op.text.clone(),
                        new_text: next.text.clone(),
                    });
                    ix += 2;
                } else {
                    nodes.push(FragmentNode::DeleteMarker {
                        deleted_text: op.text.clone(),
                    });
                    ix += 1;
                }
            }
            DiffTag::Insert => {
                nodes.push(FragmentNode::Span {
                    old_text: String::new(),
                    new_text: op.text.clone(),
                });
                ix += 1;
            }
        }
    }

    if matches!(nodes.last(), Some(FragmentNode::Span { .. })) {
        nodes.push(FragmentNode::Placeholder);
    }

    Fragment { nodes }
}

fn coalesce(ops: &[DiffOp]) -> Vec<DiffOp> {
    let mut out: Vec<DiffOp> = Vec::with_capacity(ops.len());
    for op in ops {
        if op.text.is_empty() {
            continue;
        }
        if let Some(last) = out.last_mut()
            && last.tag == op.tag
        {
            last.text.push_str(&op.text);
            continue;
        }
        out.push(op.clone());
    }
    out
}
