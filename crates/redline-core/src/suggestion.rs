use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::core::{DELETE_MARKER_KIND, Document, Editor, Node};
use crate::error::EditError;
use crate::focus::compute_focus;
use crate::lifecycle::Resolution;
use crate::ops::Op;
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, EditorPlugin, NodeRole, NodeSpec, NormalizePass,
    PluginRegistry, QueryError, QuerySpec, text_blocks_in_order,
};

/// Pending-edit commands and queries, the delete marker node and the
/// normalization that keeps a cursor slot around every marker.
pub struct SuggestionPlugin;

impl EditorPlugin for SuggestionPlugin {
    fn id(&self) -> &'static str {
        "suggestion"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: DELETE_MARKER_KIND.to_string(),
            role: NodeRole::Inline,
            is_void: true,
            children: ChildConstraint::None,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(EnsureCursorSlots)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("suggestion.accept", "Accept edit", |editor, args| {
                let id = string_arg(args.as_ref(), "id")?;
                editor.accept_edit(&id).map_err(CommandError::from)
            })
            .description("Keep the proposed text of one pending edit.")
            .keywords(["accept", "keep", "suggestion"])
            .args_example(json!({ "id": "edit-id" })),
            CommandSpec::new("suggestion.reject", "Reject edit", |editor, args| {
                let id = string_arg(args.as_ref(), "id")?;
                editor.reject_edit(&id).map_err(CommandError::from)
            })
            .description("Restore the original text of one pending edit.")
            .keywords(["reject", "discard", "suggestion"])
            .args_example(json!({ "id": "edit-id" })),
            CommandSpec::new("suggestion.accept_all", "Accept all", |editor, args| {
                resolve_many(editor, args, Resolution::Accept)
            })
            .description(
                "Accept the listed edits, or every edit touched by the selection when no ids are given.",
            )
            .keywords(["accept", "all", "bulk"])
            .args_example(json!({ "ids": ["edit-id"] })),
            CommandSpec::new("suggestion.reject_all", "Reject all", |editor, args| {
                resolve_many(editor, args, Resolution::Reject)
            })
            .description(
                "Reject the listed edits, or every edit touched by the selection when no ids are given.",
            )
            .keywords(["reject", "all", "bulk"])
            .args_example(json!({ "ids": ["edit-id"] })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("suggestion.list", |editor, _args| {
                to_json(editor.edits().entries())
            }),
            QuerySpec::new("suggestion.focus", |editor, _args| {
                to_json(&compute_focus(editor))
            }),
            QuerySpec::new("suggestion.intersecting", |editor, _args| {
                to_json(&editor.edits().intersecting(editor.doc(), editor.selection()))
            }),
            QuerySpec::new("suggestion.diff", |editor, args| {
                let old = string_arg(args.as_ref(), "old")?;
                let new = string_arg(args.as_ref(), "new")?;
                let ops = redline_diff::diff_with_options(&old, &new, editor.config().diff);
                let fragment = redline_diff::build_annotated_fragment(&ops);
                Ok(json!({
                    "ops": serde_json::to_value(&ops).map_err(encode_error)?,
                    "fragment": serde_json::to_value(&fragment).map_err(encode_error)?,
                }))
            }),
        ]
    }
}

fn resolve_many(
    editor: &mut Editor,
    args: Option<Value>,
    resolution: Resolution,
) -> Result<(), CommandError> {
    let outcome = match ids_arg(args.as_ref())? {
        Some(ids) => editor.resolve_all(&ids, resolution)?,
        None if resolution == Resolution::Accept => editor.accept_in_selection()?,
        None => editor.reject_in_selection()?,
    };
    tracing::debug!(
        resolved = outcome.resolved.len(),
        missing = outcome.missing.len(),
        "bulk command finished"
    );
    Ok(())
}

fn string_arg(args: Option<&Value>, key: &str) -> Result<String, EditError> {
    args.and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EditError::invalid_input(format!("expected a string `{key}` argument")))
}

fn ids_arg(args: Option<&Value>) -> Result<Option<Vec<String>>, EditError> {
    let Some(ids) = args.and_then(|a| a.get("ids")) else {
        return Ok(None);
    };
    let Some(items) = ids.as_array() else {
        return Err(EditError::invalid_input("`ids` must be an array of strings"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| EditError::invalid_input("`ids` must be an array of strings"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, QueryError> {
    serde_json::to_value(value).map_err(encode_error)
}

fn encode_error(err: serde_json::Error) -> QueryError {
    QueryError::new(format!("Failed to encode query result: {err}"))
}

/// Keeps a text leaf on both sides of every void and after a trailing
/// suggestion leaf, so the cursor can always sit next to an edit.
struct EnsureCursorSlots;

impl NormalizePass for EnsureCursorSlots {
    fn id(&self) -> &'static str {
        "suggestion.ensure_cursor_slots"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for block in text_blocks_in_order(doc, registry) {
            let children = &block.el.children;
            let is_text = |ix: Option<usize>| {
                ix.and_then(|ix| children.get(ix))
                    .is_some_and(|n| matches!(n, Node::Text(_)))
            };

            // Slot positions in terms of the original child indices.
            let mut slots: BTreeSet<usize> = BTreeSet::new();
            for (ix, node) in children.iter().enumerate() {
                if !matches!(node, Node::Void(_)) {
                    continue;
                }
                if !is_text(ix.checked_sub(1)) {
                    slots.insert(ix);
                }
                if !is_text(Some(ix + 1)) {
                    slots.insert(ix + 1);
                }
            }
            if let Some(Node::Text(last)) = children.last()
                && last.marks.suggestion.is_some()
            {
                slots.insert(children.len());
            }

            // Highest index first, so lower insert paths stay valid.
            for ix in slots.into_iter().rev() {
                let mut path = block.path.clone();
                path.push(ix);
                ops.push(Op::InsertNode {
                    path,
                    node: Node::text(""),
                });
            }
        }
        ops
    }
}
